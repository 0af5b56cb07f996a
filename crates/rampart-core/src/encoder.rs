//! Per-client delta frames. The header is re-sent whole every tick; the
//! cell payload only carries what this client has not been told yet,
//! bounded by the frame cap. Anything cut off trails on later ticks
//! because dirty entries stay false until they are actually sent.

use tracing::trace;

use crate::host::ScreenSnapshot;
use crate::protocol::TAG_TICK_FRAME;

/// Practical WebSocket datagram bound.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// x, y, glyph, background, foreground.
pub const CELL_RECORD_LEN: usize = 5;

pub const FLAG_RECIPIENT_ACTIVE: u8 = 1;
pub const FLAG_SESSION_IDLE: u8 = 2;
pub const FLAG_GAME_CLOCK: u8 = 4;

/// Growable byte writer with a hard cap. Header writes are unconditional
/// (the header is always small); cell records go through [`try_put_cell`],
/// which refuses rather than exceed the cap.
///
/// [`try_put_cell`]: FrameWriter::try_put_cell
#[derive(Debug)]
pub struct FrameWriter {
    buf: Vec<u8>,
    max_len: usize,
}

impl FrameWriter {
    pub fn new(max_len: usize) -> Self {
        Self {
            buf: Vec::with_capacity(max_len.min(4096)),
            max_len,
        }
    }

    pub fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn put_i32_le(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// False when the record would push past the cap; nothing is written.
    pub fn try_put_cell(&mut self, record: [u8; CELL_RECORD_LEN]) -> bool {
        if self.buf.len() + CELL_RECORD_LEN > self.max_len {
            return false;
        }
        self.buf.extend_from_slice(&record);
        true
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Everything the header carries. Small enough to re-send every tick, and
/// any of it can change between ticks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader<'a> {
    pub client_count: u8,
    pub recipient_active: bool,
    pub session_idle: bool,
    pub using_game_clock: bool,
    /// Seconds (or game ticks) left in the current turn, -1 = unlimited.
    pub time_left: i32,
    pub width: u8,
    pub height: u8,
    /// Active player's nickname, or the reserved placeholder while idle.
    pub active_name: &'a str,
}

/// Build one tick frame for one client, marking every emitted cell as sent
/// in `dirty`. `dirty.len()` must match the snapshot's cell count.
pub fn encode_tick_frame(
    header: &FrameHeader<'_>,
    snapshot: &ScreenSnapshot,
    dirty: &mut [bool],
    max_len: usize,
) -> Vec<u8> {
    debug_assert_eq!(dirty.len(), snapshot.cell_count());

    let mut writer = FrameWriter::new(max_len);
    writer.put_u8(TAG_TICK_FRAME);
    writer.put_u8(header.client_count);

    let mut flags = 0u8;
    if header.recipient_active {
        flags |= FLAG_RECIPIENT_ACTIVE;
    }
    if header.session_idle {
        flags |= FLAG_SESSION_IDLE;
    }
    if header.using_game_clock {
        flags |= FLAG_GAME_CLOCK;
    }
    writer.put_u8(flags);

    writer.put_i32_le(header.time_left);
    writer.put_u8(header.width);
    writer.put_u8(header.height);

    // length includes the NUL terminator
    let name = header.active_name.as_bytes();
    writer.put_u8((name.len() + 1) as u8);
    writer.put_bytes(name);
    writer.put_u8(0);

    let mut truncated = false;
    'sweep: for y in 0..snapshot.height() {
        for x in 0..snapshot.width() {
            let tile = snapshot.tile_index(x, y);
            if dirty[tile] {
                continue;
            }
            let cell = snapshot.cell(x, y);
            let fg = ((cell.fg as u16 + if cell.bold { 8 } else { 0 }) % 16) as u8;
            if !writer.try_put_cell([x, y, cell.glyph, cell.bg, fg]) {
                truncated = true;
                break 'sweep;
            }
            dirty[tile] = true;
        }
    }
    if truncated {
        trace!(max_len, "frame cap reached, remaining cells trail to later ticks");
    }

    writer.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Cell;

    fn snapshot_2x2() -> ScreenSnapshot {
        let mut snapshot = ScreenSnapshot::new(2, 2);
        snapshot.set_cell(
            0,
            0,
            Cell {
                glyph: b'A',
                fg: 7,
                bg: 0,
                bold: false,
            },
        );
        snapshot.set_cell(
            1,
            0,
            Cell {
                glyph: b'B',
                fg: 7,
                bg: 1,
                bold: true,
            },
        );
        snapshot.set_cell(
            0,
            1,
            Cell {
                glyph: b'C',
                fg: 12,
                bg: 2,
                bold: true,
            },
        );
        snapshot.set_cell(
            1,
            1,
            Cell {
                glyph: b'D',
                fg: 0,
                bg: 3,
                bold: false,
            },
        );
        snapshot
    }

    fn header<'a>(name: &'a str) -> FrameHeader<'a> {
        FrameHeader {
            client_count: 2,
            recipient_active: true,
            session_idle: false,
            using_game_clock: true,
            time_left: -1,
            width: 2,
            height: 2,
            active_name: name,
        }
    }

    #[test]
    fn header_layout_is_byte_exact() {
        let snapshot = snapshot_2x2();
        let mut dirty = vec![true; 4];
        let frame = encode_tick_frame(&header("ada"), &snapshot, &mut dirty, MAX_FRAME_LEN);
        assert_eq!(
            frame,
            vec![
                110, // tag
                2,   // client count
                FLAG_RECIPIENT_ACTIVE | FLAG_GAME_CLOCK,
                0xFF, 0xFF, 0xFF, 0xFF, // -1, little-endian
                2, 2, // dimensions
                4, // name length including terminator
                b'a', b'd', b'a', 0,
            ]
        );
    }

    #[test]
    fn cells_sweep_in_raster_order_and_pack_bold() {
        let snapshot = snapshot_2x2();
        let mut dirty = vec![false; 4];
        let frame = encode_tick_frame(&header(""), &snapshot, &mut dirty, MAX_FRAME_LEN);
        let body = &frame[11..];
        assert_eq!(
            body,
            [
                0, 0, b'A', 0, 7,  // plain white
                1, 0, b'B', 1, 15, // bold folds into the bright palette
                0, 1, b'C', 2, 4,  // (12 + 8) % 16
                1, 1, b'D', 3, 8,  // bold black
            ]
        );
        assert!(dirty.iter().all(|&sent| sent));
    }

    #[test]
    fn already_sent_cells_are_skipped() {
        let snapshot = snapshot_2x2();
        let mut dirty = vec![false; 4];
        // tile index is x * height + y
        dirty[snapshot.tile_index(1, 0)] = true;
        dirty[snapshot.tile_index(0, 1)] = true;
        let frame = encode_tick_frame(&header(""), &snapshot, &mut dirty, MAX_FRAME_LEN);
        let body = &frame[11..];
        assert_eq!(body.len(), 2 * CELL_RECORD_LEN);
        assert_eq!(&body[..2], &[0, 0]);
        assert_eq!(&body[5..7], &[1, 1]);
    }

    #[test]
    fn frame_cap_truncates_without_marking_unsent_cells() {
        let snapshot = snapshot_2x2();
        let mut dirty = vec![false; 4];
        // header is 11 bytes with an empty name; room for exactly two records
        let frame = encode_tick_frame(&header(""), &snapshot, &mut dirty, 11 + 2 * CELL_RECORD_LEN);
        assert_eq!(frame.len(), 11 + 2 * CELL_RECORD_LEN);
        assert_eq!(dirty.iter().filter(|&&sent| sent).count(), 2);

        // the rest arrives on the next tick
        let frame = encode_tick_frame(&header(""), &snapshot, &mut dirty, MAX_FRAME_LEN);
        assert_eq!(frame.len(), 11 + 2 * CELL_RECORD_LEN);
        assert!(dirty.iter().all(|&sent| sent));
    }

    #[test]
    fn static_grid_is_sent_exactly_once() {
        let snapshot = snapshot_2x2();
        let mut dirty = vec![false; 4];
        encode_tick_frame(&header(""), &snapshot, &mut dirty, MAX_FRAME_LEN);
        let frame = encode_tick_frame(&header(""), &snapshot, &mut dirty, MAX_FRAME_LEN);
        // header only, no cell records
        assert_eq!(frame.len(), 11);
    }
}
