//! Inbound wire protocol: one tag byte followed by a fixed payload. All
//! multi-byte integers anywhere in the protocol are little-endian.

use crate::error::DecodeError;

/// Subprotocol string negotiated during the WebSocket handshake. Connections
/// that do not request it are closed with the invalid-version code.
pub const SUBPROTOCOL: &str = "rampart-v1";

/// Placeholder carried in the frame's active-name field while nobody holds
/// the turn. Connecting under this name is refused.
pub const RESERVED_NAME: &str = "__NOBODY";

pub const TAG_TICK_FRAME: u8 = 110;
pub const TAG_KEY: u8 = 111;
pub const TAG_RESIZE: u8 = 112;
pub const TAG_REFRESH: u8 = 115;
pub const TAG_TURN: u8 = 116;

const KEY_MESSAGE_LEN: usize = 4;
const RESIZE_MESSAGE_LEN: usize = 3;

/// Modifier bitfield as sent by clients: bit0 alt, bit1 shift, bit2 ctrl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyModifiers {
    pub alt: bool,
    pub shift: bool,
    pub ctrl: bool,
}

impl KeyModifiers {
    pub fn from_bits(bits: u8) -> Self {
        Self {
            alt: bits & 1 != 0,
            shift: bits & 2 != 0,
            ctrl: bits & 4 != 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.alt || self.shift || self.ctrl)
    }
}

/// Logical key injected into the controlled process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(u8),
    Backspace,
    Tab,
    Enter,
    Escape,
    Space,
    PageUp,
    PageDown,
    End,
    Home,
    Left,
    Up,
    Right,
    Down,
    Insert,
    Delete,
    /// F1..=F12
    Function(u8),
    Alt,
    Shift,
    Ctrl,
}

/// Browser keyCode table for the specials and the few printable ranges
/// clients report by code rather than by literal character.
pub fn map_portable_code(code: u8) -> Option<Key> {
    Some(match code {
        8 => Key::Backspace,
        9 => Key::Tab,
        13 => Key::Enter,
        27 => Key::Escape,
        32 => Key::Space,
        33 => Key::PageUp,
        34 => Key::PageDown,
        35 => Key::End,
        36 => Key::Home,
        37 => Key::Left,
        38 => Key::Up,
        39 => Key::Right,
        40 => Key::Down,
        45 => Key::Insert,
        46 => Key::Delete,
        48..=57 => Key::Char(code),
        // letters arrive as uppercase codes
        65..=90 => Key::Char(code + 32),
        // numpad digits
        96..=105 => Key::Char(code - 48),
        112..=123 => Key::Function(code - 111),
        _ => return None,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub code: u8,
    pub literal: u8,
    pub mods: KeyModifiers,
}

impl KeyEvent {
    /// A non-zero literal character is the key itself; otherwise the
    /// portable code decides. `None` means an unmappable code: the whole
    /// event is dropped.
    pub fn resolve(&self) -> Option<Key> {
        if self.literal != 0 {
            if self.literal == 27 {
                Some(Key::Escape)
            } else {
                Some(Key::Char(self.literal))
            }
        } else {
            map_portable_code(self.code)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCommand {
    Resize { width: u8, height: u8 },
    Key(KeyEvent),
    Refresh,
    TurnToggle,
    /// Any unrecognized tag: the client wants a tick frame right now.
    TickRequest,
}

/// Decode one inbound message. Tags 111 and 112 require their exact
/// message length; 115 and 116 ignore trailing bytes.
pub fn decode(payload: &[u8]) -> Result<ClientCommand, DecodeError> {
    let &tag = payload.first().ok_or(DecodeError::Empty)?;
    match tag {
        TAG_RESIZE => {
            if payload.len() != RESIZE_MESSAGE_LEN {
                return Err(DecodeError::BadLength {
                    tag,
                    expected: RESIZE_MESSAGE_LEN,
                    actual: payload.len(),
                });
            }
            Ok(ClientCommand::Resize {
                width: payload[1],
                height: payload[2],
            })
        }
        TAG_KEY => {
            if payload.len() != KEY_MESSAGE_LEN {
                return Err(DecodeError::BadLength {
                    tag,
                    expected: KEY_MESSAGE_LEN,
                    actual: payload.len(),
                });
            }
            Ok(ClientCommand::Key(KeyEvent {
                code: payload[1],
                literal: payload[2],
                mods: KeyModifiers::from_bits(payload[3]),
            }))
        }
        TAG_REFRESH => Ok(ClientCommand::Refresh),
        TAG_TURN => Ok(ClientCommand::TurnToggle),
        _ => Ok(ClientCommand::TickRequest),
    }
}
