//! Core state machine for Rampart: many viewers watch one shared character
//! grid, at most one of them holds the turn and may inject input into the
//! process that owns it.
//!
//! This crate is transport-agnostic and does no I/O of its own. The hosting
//! process drives [`Session`] from its connection callbacks and a periodic
//! tick, and plugs in the grid capture, input injection and checkpoint
//! machinery through the traits in [`host`].

pub mod arbiter;
pub mod clock;
pub mod encoder;
pub mod error;
pub mod host;
pub mod protocol;
pub mod registry;
pub mod session;

pub use arbiter::{TurnEnd, TurnEvent};
pub use clock::{Clock, GameClock, WallClock};
pub use error::{CapacityExceeded, ConnectError, DecodeError};
pub use host::{Cell, HostHooks, InputSink, ScreenSnapshot, ScreenSource};
pub use protocol::{
    ClientCommand, Key, KeyEvent, KeyModifiers, RESERVED_NAME, SUBPROTOCOL,
};
pub use registry::{Client, ClientId, Registry};
pub use session::{Session, SessionConfig, SessionEvent, StatusReport};
