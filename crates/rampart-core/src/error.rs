use thiserror::Error;

/// The registry is at its configured connection limit. A refusal at connect
/// time, never a mid-session teardown.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("server is full")]
pub struct CapacityExceeded;

/// Why a connection attempt was refused. The transport layer maps these to
/// distinct WebSocket close codes so clients can tell the cases apart.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectError {
    #[error("server is full")]
    CapacityExceeded,

    #[error("nickname {0:?} is reserved")]
    ReservedName(String),
}

impl From<CapacityExceeded> for ConnectError {
    fn from(_: CapacityExceeded) -> Self {
        ConnectError::CapacityExceeded
    }
}

/// A malformed inbound message. Dropped silently; the connection stays open.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("empty message")]
    Empty,

    #[error("tag {tag} expects a {expected}-byte message, got {actual}")]
    BadLength {
        tag: u8,
        expected: usize,
        actual: usize,
    },
}
