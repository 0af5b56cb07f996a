//! The façade the transport layer drives: connect, disconnect, message,
//! tick. Owns the registry, the arbiter and the collaborator handles; the
//! host is expected to serialize all calls (one mutex or one executor).

use std::sync::Arc;

use tracing::{debug, info};

use crate::arbiter::{TurnArbiter, TurnEnd, TurnEvent};
use crate::clock::Clock;
use crate::encoder::{self, FrameHeader, MAX_FRAME_LEN};
use crate::error::ConnectError;
use crate::host::{HostHooks, InputSink, ScreenSnapshot, ScreenSource};
use crate::protocol::{self, ClientCommand, Key, KeyEvent, KeyModifiers, RESERVED_NAME};
use crate::registry::{ClientId, Registry};

/// The frame's name-length field is one byte including the terminator;
/// keep nicknames comfortably inside it.
const MAX_NICKNAME_LEN: usize = 63;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub max_clients: usize,
    /// Clock units per turn; 0 disables the turn timer entirely.
    pub turn_duration: i64,
    /// Clock units of idle before the checkpoint hook fires.
    pub idle_grace: i64,
    /// Whether the idle checkpoint fires at all.
    pub idle_checkpoint: bool,
    /// Reported to clients in the frame bitfield; pick the matching clock.
    pub use_game_clock: bool,
    pub max_frame_len: usize,
    /// Neutral key pressed twice to unpause the host when a turn starts.
    pub unpause_key: Key,
    /// Shared secret granting privilege; `None` means nobody is privileged.
    pub secret: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_clients: 32,
            turn_duration: 300,
            idle_grace: 10,
            idle_checkpoint: true,
            use_game_clock: false,
            max_frame_len: MAX_FRAME_LEN,
            unpause_key: Key::Space,
            secret: None,
        }
    }
}

/// Turn-arbitration outcomes surfaced to the embedding layer for logging
/// and monitoring. Drained with [`Session::drain_events`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    TurnSeized { id: ClientId, nickname: String },
    TurnEnded { id: ClientId, reason: TurnEnd },
}

/// Stateless projection of session state for the status endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub active_players: usize,
    pub current_player: String,
    pub time_left: i32,
    pub is_somebody_playing: bool,
    pub using_game_clock: bool,
}

pub struct Session {
    config: SessionConfig,
    registry: Registry,
    arbiter: TurnArbiter,
    screen: Arc<dyn ScreenSource>,
    input: Box<dyn InputSink>,
    hooks: Box<dyn HostHooks>,
    clock: Box<dyn Clock>,
    events: Vec<SessionEvent>,
    next_id: u64,
}

impl Session {
    pub fn new(
        config: SessionConfig,
        screen: Arc<dyn ScreenSource>,
        input: Box<dyn InputSink>,
        hooks: Box<dyn HostHooks>,
        clock: Box<dyn Clock>,
    ) -> Self {
        let now = clock.now();
        Self {
            registry: Registry::new(config.max_clients),
            arbiter: TurnArbiter::new(
                config.turn_duration,
                config.idle_grace,
                config.idle_checkpoint,
                config.unpause_key,
                now,
            ),
            screen,
            input,
            hooks,
            clock,
            events: Vec::new(),
            next_id: 1,
            config,
        }
    }

    /// Admit a connection. The transport layer has already negotiated the
    /// protocol version; this refuses the reserved nickname and capacity
    /// overruns, each with a distinct error for the close code.
    pub fn connect(
        &mut self,
        nickname: &str,
        secret: Option<&str>,
        remote_addr: &str,
    ) -> Result<ClientId, ConnectError> {
        if nickname == RESERVED_NAME {
            return Err(ConnectError::ReservedName(nickname.to_string()));
        }
        let nickname = truncate_nickname(nickname);
        let is_privileged = match (&self.config.secret, secret) {
            (Some(expected), Some(given)) => expected == given,
            _ => false,
        };

        let (width, height) = self.screen.dimensions();
        let cells = width as usize * height as usize;
        let id = ClientId(self.next_id);
        let now = self.clock.now();
        self.registry.register(
            id,
            nickname.clone(),
            is_privileged,
            remote_addr.to_string(),
            cells,
            now,
        )?;
        self.next_id += 1;
        info!(%id, nickname, remote_addr, is_privileged, "client connected");
        Ok(id)
    }

    /// Remove a connection, forcing the turn idle first if this client
    /// held it.
    pub fn disconnect(&mut self, id: ClientId) {
        if self.arbiter.active() == Some(id) {
            if let Some(event) = self.arbiter.release(TurnEnd::Disconnected, self.clock.as_ref()) {
                self.push_turn_event(event);
            }
        }
        if let Some(client) = self.registry.unregister(id) {
            info!(%id, nickname = %client.nickname, "client disconnected");
        }
    }

    /// Decode and dispatch one inbound message. Returns a frame to send
    /// back immediately when the message asked for one; every failure mode
    /// here is a silent drop, never a disconnect.
    pub fn handle_message(&mut self, id: ClientId, payload: &[u8]) -> Option<Vec<u8>> {
        let command = match protocol::decode(payload) {
            Ok(command) => command,
            Err(err) => {
                debug!(%id, %err, "dropping malformed message");
                return None;
            }
        };

        match command {
            ClientCommand::Resize { width, height } => {
                if self.arbiter.active() == Some(id) {
                    self.input.request_resize(width, height);
                } else {
                    debug!(%id, "ignoring resize from non-active client");
                }
                None
            }
            ClientCommand::Key(event) => {
                self.handle_key(id, event);
                None
            }
            ClientCommand::Refresh => {
                if let Some(client) = self.registry.lookup_mut(id) {
                    client.clear_dirty();
                }
                None
            }
            ClientCommand::TurnToggle => {
                let event = self.arbiter.request_turn(
                    id,
                    &mut self.registry,
                    self.clock.as_ref(),
                    self.hooks.as_mut(),
                    self.input.as_mut(),
                );
                if let Some(event) = event {
                    self.push_turn_event(event);
                }
                None
            }
            ClientCommand::TickRequest => {
                let snapshot = self.screen.snapshot();
                Some(self.encode_for(id, &snapshot))
            }
        }
    }

    fn handle_key(&mut self, id: ClientId, event: KeyEvent) {
        if self.arbiter.active() != Some(id) {
            debug!(%id, "ignoring key event from non-active client");
            return;
        }
        let Some(key) = event.resolve() else {
            debug!(%id, code = event.code, "ignoring unknown key code");
            return;
        };
        if key == Key::Escape && !self.escape_allowed(id) {
            debug!(%id, "dropping escape from unprivileged client");
            return;
        }

        let mods = event.mods;
        let none = KeyModifiers::default();
        if mods.alt {
            self.input.inject_key(true, Key::Alt, 0, none);
        }
        if mods.shift {
            self.input.inject_key(true, Key::Shift, 0, none);
        }
        if mods.ctrl {
            self.input.inject_key(true, Key::Ctrl, 0, none);
        }
        self.input.inject_key(true, key, event.literal, mods);
        self.input.inject_key(false, key, event.literal, mods);
        if mods.alt {
            self.input.inject_key(false, Key::Alt, 0, none);
        }
        if mods.shift {
            self.input.inject_key(false, Key::Shift, 0, none);
        }
        if mods.ctrl {
            self.input.inject_key(false, Key::Ctrl, 0, none);
        }
    }

    fn escape_allowed(&self, id: ClientId) -> bool {
        let privileged = self
            .registry
            .lookup(id)
            .map(|client| client.is_privileged)
            .unwrap_or(false);
        privileged || self.hooks.is_safe_to_escape()
    }

    /// One externally driven tick: poll both timers, then build a delta
    /// frame for every connected client.
    pub fn tick(&mut self) -> Vec<(ClientId, Vec<u8>)> {
        self.arbiter
            .poll_idle_timer(self.clock.as_ref(), self.hooks.as_mut());
        if let Some(event) = self
            .arbiter
            .poll_turn_timer(&self.registry, self.clock.as_ref())
        {
            if let TurnEvent::Ended { id, .. } = &event {
                if let Some(client) = self.registry.lookup(*id) {
                    info!("{} has run out of time", client.log_label());
                }
            }
            self.push_turn_event(event);
        }

        let snapshot = self.screen.snapshot();
        let mut frames = Vec::with_capacity(self.registry.len());
        for id in self.registry.ids() {
            frames.push((id, self.encode_for(id, &snapshot)));
        }
        frames
    }

    /// Called by the capture layer whenever it rewrites grid cells, so the
    /// next tick re-sends them to every client.
    pub fn invalidate_cells(&mut self, tiles: &[usize]) {
        for client in self.registry.iter_mut() {
            for &tile in tiles {
                client.invalidate(tile);
            }
        }
    }

    pub fn active_client(&self) -> Option<ClientId> {
        self.arbiter.active()
    }

    pub fn client_count(&self) -> usize {
        self.registry.len()
    }

    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn status(&self) -> StatusReport {
        let active = self.arbiter.active();
        StatusReport {
            active_players: self.registry.len(),
            current_player: active
                .and_then(|id| self.registry.lookup(id))
                .map(|client| client.nickname.clone())
                .unwrap_or_default(),
            time_left: self.arbiter.time_left(&self.registry, self.clock.as_ref()),
            is_somebody_playing: active.is_some(),
            using_game_clock: self.config.use_game_clock,
        }
    }

    fn encode_for(&mut self, id: ClientId, snapshot: &ScreenSnapshot) -> Vec<u8> {
        let time_left = self.arbiter.time_left(&self.registry, self.clock.as_ref());
        let active = self.arbiter.active();
        let active_name = active
            .and_then(|active_id| self.registry.lookup(active_id))
            .map(|client| client.nickname.clone())
            .unwrap_or_else(|| RESERVED_NAME.to_string());

        let header = FrameHeader {
            client_count: self.registry.len().min(255) as u8,
            recipient_active: active == Some(id),
            session_idle: active.is_none(),
            using_game_clock: self.config.use_game_clock,
            time_left,
            width: snapshot.width(),
            height: snapshot.height(),
            active_name: &active_name,
        };

        let max_len = self.config.max_frame_len;
        let Some(client) = self.registry.lookup_mut(id) else {
            return Vec::new();
        };
        if client.dirty_len() != snapshot.cell_count() {
            client.resize_dirty(snapshot.cell_count());
        }
        encoder::encode_tick_frame(&header, snapshot, client.dirty_mask_mut(), max_len)
    }

    fn push_turn_event(&mut self, event: TurnEvent) {
        self.events.push(match event {
            TurnEvent::Seized { id, nickname } => SessionEvent::TurnSeized { id, nickname },
            TurnEvent::Ended { id, reason } => SessionEvent::TurnEnded { id, reason },
        });
    }
}

fn truncate_nickname(nickname: &str) -> String {
    if nickname.len() <= MAX_NICKNAME_LEN {
        return nickname.to_string();
    }
    let mut end = MAX_NICKNAME_LEN;
    while !nickname.is_char_boundary(end) {
        end -= 1;
    }
    nickname[..end].to_string()
}
