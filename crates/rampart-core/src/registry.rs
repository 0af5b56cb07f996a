use std::collections::HashMap;
use std::fmt;

use crate::error::CapacityExceeded;

/// Opaque connection handle. Unique per connection, stable for its
/// lifetime, minted by the session service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One live connection's record.
#[derive(Debug, Clone)]
pub struct Client {
    pub id: ClientId,
    /// Empty means anonymous ("a wandering spirit").
    pub nickname: String,
    /// Set once at connect from the presented secret; never changes.
    pub is_privileged: bool,
    /// Informational only.
    pub remote_addr: String,
    /// Clock units; meaningful only while this client holds the turn.
    pub turn_started_at: i64,
    /// One entry per grid cell: true once the cell has been sent to this
    /// client and has not changed since. Entries only flip back to false on
    /// connect, turn start, refresh, resize or cell invalidation.
    dirty: Vec<bool>,
}

impl Client {
    fn new(
        id: ClientId,
        nickname: String,
        is_privileged: bool,
        remote_addr: String,
        cells: usize,
        now: i64,
    ) -> Self {
        Self {
            id,
            nickname,
            is_privileged,
            remote_addr,
            turn_started_at: now,
            dirty: vec![false; cells],
        }
    }

    /// Nickname for announcements and operator logs, falling back to the
    /// remote address for anonymous clients.
    pub fn log_label(&self) -> &str {
        if self.nickname.is_empty() {
            &self.remote_addr
        } else {
            &self.nickname
        }
    }

    pub fn dirty_len(&self) -> usize {
        self.dirty.len()
    }

    pub fn dirty_mask(&self) -> &[bool] {
        &self.dirty
    }

    pub fn dirty_mask_mut(&mut self) -> &mut [bool] {
        &mut self.dirty
    }

    /// Force a full resend on subsequent ticks.
    pub fn clear_dirty(&mut self) {
        self.dirty.fill(false);
    }

    /// Reallocate for new grid dimensions; everything becomes unsent.
    pub fn resize_dirty(&mut self, cells: usize) {
        self.dirty.clear();
        self.dirty.resize(cells, false);
    }

    /// Mark one cell as changed-since-sent.
    pub fn invalidate(&mut self, tile: usize) {
        if let Some(sent) = self.dirty.get_mut(tile) {
            *sent = false;
        }
    }
}

/// Owns every live [`Client`] record, bounded by the configured maximum
/// concurrent-connection count.
#[derive(Debug)]
pub struct Registry {
    clients: HashMap<ClientId, Client>,
    capacity: usize,
}

impl Registry {
    pub fn new(capacity: usize) -> Self {
        Self {
            clients: HashMap::new(),
            capacity,
        }
    }

    pub fn register(
        &mut self,
        id: ClientId,
        nickname: String,
        is_privileged: bool,
        remote_addr: String,
        cells: usize,
        now: i64,
    ) -> Result<&mut Client, CapacityExceeded> {
        if self.clients.len() >= self.capacity {
            return Err(CapacityExceeded);
        }
        // ids are minted from a monotonic counter and must never repeat
        debug_assert!(!self.clients.contains_key(&id), "client id {id} reused");
        let client = Client::new(id, nickname, is_privileged, remote_addr, cells, now);
        Ok(self.clients.entry(id).or_insert(client))
    }

    pub fn lookup(&self, id: ClientId) -> Option<&Client> {
        self.clients.get(&id)
    }

    pub fn lookup_mut(&mut self, id: ClientId) -> Option<&mut Client> {
        self.clients.get_mut(&id)
    }

    pub fn unregister(&mut self, id: ClientId) -> Option<Client> {
        self.clients.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Client> {
        self.clients.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Client> {
        self.clients.values_mut()
    }

    /// Connection ids in a stable order for the tick fan-out.
    pub fn ids(&self) -> Vec<ClientId> {
        let mut ids: Vec<ClientId> = self.clients.keys().copied().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register(registry: &mut Registry, id: u64) -> Result<(), CapacityExceeded> {
        registry
            .register(ClientId(id), format!("spirit{id}"), false, "test".into(), 8, 0)
            .map(|_| ())
    }

    #[test]
    fn capacity_is_a_refusal() {
        let mut registry = Registry::new(2);
        register(&mut registry, 1).unwrap();
        register(&mut registry, 2).unwrap();
        assert_eq!(register(&mut registry, 3), Err(CapacityExceeded));
        assert_eq!(registry.len(), 2);

        // room frees up on unregister
        registry.unregister(ClientId(1)).unwrap();
        register(&mut registry, 3).unwrap();
    }

    #[test]
    #[should_panic(expected = "reused")]
    fn reusing_a_client_id_is_a_bug() {
        let mut registry = Registry::new(4);
        register(&mut registry, 1).unwrap();
        let _ = register(&mut registry, 1);
    }

    #[test]
    fn lookup_after_unregister_is_none() {
        let mut registry = Registry::new(4);
        register(&mut registry, 7).unwrap();
        assert!(registry.lookup(ClientId(7)).is_some());
        registry.unregister(ClientId(7));
        assert!(registry.lookup(ClientId(7)).is_none());
    }

    #[test]
    fn resize_reallocates_and_clears() {
        let mut registry = Registry::new(1);
        register(&mut registry, 1).unwrap();
        let client = registry.lookup_mut(ClientId(1)).unwrap();
        client.dirty_mask_mut().fill(true);
        client.resize_dirty(20);
        assert_eq!(client.dirty_len(), 20);
        assert!(client.dirty_mask().iter().all(|&sent| !sent));
    }

    #[test]
    fn invalidate_ignores_out_of_range_tiles() {
        let mut registry = Registry::new(1);
        register(&mut registry, 1).unwrap();
        let client = registry.lookup_mut(ClientId(1)).unwrap();
        client.dirty_mask_mut().fill(true);
        client.invalidate(3);
        client.invalidate(999);
        assert!(!client.dirty_mask()[3]);
        assert_eq!(client.dirty_mask().iter().filter(|&&sent| sent).count(), 7);
    }

    #[test]
    fn anonymous_clients_log_their_address() {
        let mut registry = Registry::new(1);
        registry
            .register(ClientId(1), String::new(), false, "10.0.0.1:9".into(), 8, 0)
            .unwrap();
        assert_eq!(registry.lookup(ClientId(1)).unwrap().log_label(), "10.0.0.1:9");
    }
}
