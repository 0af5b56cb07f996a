//! Built-in host integration so the binary runs end to end without a real
//! game behind it: a scrolling test card for the screen, an input sink
//! that logs what a real host would inject, and hooks that log the
//! checkpoint and announcements.

use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use rampart_core::{
    Cell, HostHooks, InputSink, Key, KeyModifiers, ScreenSnapshot, ScreenSource,
};

const BANNER: &[u8] = b"  RAMPART DEMO GRID -- take the turn and type  ";
const SPINNER: &[u8] = b"|/-\\";

/// Test-card grid: a static border and title, plus a marquee row and a
/// spinner that change every tick.
pub struct DemoScreen {
    inner: Mutex<DemoState>,
}

struct DemoState {
    width: u8,
    height: u8,
    offset: usize,
}

impl DemoScreen {
    pub fn new(width: u8, height: u8) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(DemoState {
                width: width.max(4),
                height: height.max(4),
                offset: 0,
            }),
        })
    }

    /// Advance the animation one step and report which tiles changed, so
    /// the session can clear their dirty bits.
    pub fn advance(&self) -> Vec<usize> {
        let mut state = self.inner.lock().expect("demo screen poisoned");
        state.offset = state.offset.wrapping_add(1);

        let height = state.height as usize;
        let marquee_y = state.height / 2;
        // tile index is x * height + y; the spinner sits at (width-1, 0)
        let spinner_tile = (state.width as usize - 1) * height;
        let mut changed: Vec<usize> = (1..state.width as usize - 1)
            .map(|x| x * height + marquee_y as usize)
            .collect();
        changed.push(spinner_tile);
        changed
    }

    pub fn set_size(&self, width: u8, height: u8) {
        let mut state = self.inner.lock().expect("demo screen poisoned");
        state.width = width.max(4);
        state.height = height.max(4);
    }
}

impl ScreenSource for DemoScreen {
    fn dimensions(&self) -> (u8, u8) {
        let state = self.inner.lock().expect("demo screen poisoned");
        (state.width, state.height)
    }

    fn snapshot(&self) -> ScreenSnapshot {
        let state = self.inner.lock().expect("demo screen poisoned");
        let (width, height) = (state.width, state.height);
        let mut snapshot = ScreenSnapshot::new(width, height);

        for x in 0..width {
            for y in 0..height {
                let edge = x == 0 || y == 0 || x == width - 1 || y == height - 1;
                if edge {
                    snapshot.set_cell(
                        x,
                        y,
                        Cell {
                            glyph: b'#',
                            fg: 8,
                            bg: 0,
                            bold: false,
                        },
                    );
                }
            }
        }

        let marquee_y = height / 2;
        for x in 1..width - 1 {
            let glyph = BANNER[(x as usize + state.offset) % BANNER.len()];
            snapshot.set_cell(
                x,
                marquee_y,
                Cell {
                    glyph,
                    fg: (x % 7) + 1,
                    bg: 0,
                    bold: true,
                },
            );
        }

        snapshot.set_cell(
            width - 1,
            0,
            Cell {
                glyph: SPINNER[state.offset % SPINNER.len()],
                fg: 7,
                bg: 0,
                bold: true,
            },
        );

        snapshot
    }
}

/// Logs what a real host would feed into its input queue, and honors
/// resize requests by resizing the demo grid.
pub struct DemoInput {
    screen: Arc<DemoScreen>,
}

impl DemoInput {
    pub fn new(screen: Arc<DemoScreen>) -> Self {
        Self { screen }
    }
}

impl InputSink for DemoInput {
    fn inject_key(&mut self, pressed: bool, key: Key, literal: u8, mods: KeyModifiers) {
        debug!(pressed, ?key, literal, ?mods, "injected key");
    }

    fn request_resize(&mut self, width: u8, height: u8) {
        info!(width, height, "resize requested by active player");
        self.screen.set_size(width, height);
    }
}

pub struct DemoHooks;

impl HostHooks for DemoHooks {
    fn is_paused(&self) -> bool {
        false
    }

    fn is_safe_to_escape(&self) -> bool {
        true
    }

    fn checkpoint(&mut self) {
        info!("Quicksave triggered.");
    }

    fn announce(&mut self, message: &str) {
        info!("{message}");
    }
}
