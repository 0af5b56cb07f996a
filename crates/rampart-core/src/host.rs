//! Seams to the process that owns the grid. The core never touches the
//! screen buffer, the input queue or the save machinery directly; the host
//! hands in implementations of these traits.

use crate::protocol::{Key, KeyModifiers};

/// One grid cell as captured from the host renderer. `fg` is a 16-colour
/// palette index; the encoder folds `bold` into its upper half on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cell {
    pub glyph: u8,
    pub fg: u8,
    pub bg: u8,
    pub bold: bool,
}

/// A complete copy of the grid at one instant. Cells are stored
/// column-major (`index = x * height + y`), matching the dirty-mask layout
/// the encoder sweeps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenSnapshot {
    width: u8,
    height: u8,
    cells: Vec<Cell>,
}

impl ScreenSnapshot {
    pub fn new(width: u8, height: u8) -> Self {
        let cells = vec![Cell::default(); width as usize * height as usize];
        Self {
            width,
            height,
            cells,
        }
    }

    pub fn width(&self) -> u8 {
        self.width
    }

    pub fn height(&self) -> u8 {
        self.height
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn tile_index(&self, x: u8, y: u8) -> usize {
        x as usize * self.height as usize + y as usize
    }

    pub fn cell(&self, x: u8, y: u8) -> Cell {
        self.cells[self.tile_index(x, y)]
    }

    pub fn set_cell(&mut self, x: u8, y: u8, cell: Cell) {
        let tile = self.tile_index(x, y);
        self.cells[tile] = cell;
    }
}

/// Read-only view of the shared grid. Implementations must publish complete
/// frames: a snapshot never observes a half-applied update.
pub trait ScreenSource: Send + Sync {
    fn dimensions(&self) -> (u8, u8);

    fn snapshot(&self) -> ScreenSnapshot;
}

/// Simulated input into the controlled process.
pub trait InputSink: Send {
    /// Inject one key transition. `literal` carries the raw character byte
    /// when the client sent one, 0 otherwise.
    fn inject_key(&mut self, pressed: bool, key: Key, literal: u8, mods: KeyModifiers);

    /// Ask the host renderer to adopt a new grid size. The mask realloc
    /// happens when the new dimensions show up in a later snapshot.
    fn request_resize(&mut self, width: u8, height: u8);
}

/// Host-side state queries and side effects the arbiter needs.
pub trait HostHooks: Send {
    /// Whether the controlled process is currently paused.
    fn is_paused(&self) -> bool;

    /// Whether leaving the current screen via escape is harmless right now.
    /// Gates the escape key for non-privileged clients.
    fn is_safe_to_escape(&self) -> bool;

    /// Idle action: fired once per idle stretch after the grace period.
    fn checkpoint(&mut self);

    /// Surface a human-readable announcement in the host display.
    fn announce(&mut self, message: &str);
}
