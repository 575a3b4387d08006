use tracing::{debug, trace};

use super::surface::ViewSurface;
use super::viewport::ViewportWindow;
use crate::cache::BitStore;
use crate::protocol::{ProtocolError, ServerMessage, ServerMessageKind};

/// What a server frame did to the local replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    Initialized { cells: usize, slots: usize },
    Toggled { index: usize, value: bool },
    Diff { count: usize, value: bool },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub messages: u64,
    pub inits: u64,
    pub cells_applied: u64,
}

/// Routes decoded server frames onto the store and the window.
#[derive(Debug, Default)]
pub struct Dispatcher {
    stats: DispatchStats,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    pub fn handle<S>(
        &mut self,
        message: &ServerMessage,
        store: &mut BitStore,
        viewport: &mut ViewportWindow,
        surface: &mut S,
    ) -> Result<Dispatched, ProtocolError>
    where
        S: ViewSurface + ?Sized,
    {
        let outcome = match message.kind {
            ServerMessageKind::Init => {
                *store = BitStore::initialize(&message.body, message.last_byte_bits());
                let size = surface.measure();
                viewport.recompute_layout(size.width, size.height, store.size());
                viewport.populate(surface, store.initial_cells());
                self.stats.inits += 1;
                debug!(
                    target = "client::dispatch",
                    cells = store.initial_len(),
                    bytes = message.body.len(),
                    slots = viewport.slots().len(),
                    "init applied"
                );
                Dispatched::Initialized {
                    cells: store.initial_len(),
                    slots: viewport.slots().len(),
                }
            }
            ServerMessageKind::Toggled => {
                let index = message.toggled_index()?;
                let value = message.value();
                store.set(index, value);
                viewport.request_refresh();
                self.stats.cells_applied += 1;
                trace!(target = "client::dispatch", index, value, "toggle applied");
                Dispatched::Toggled { index, value }
            }
            ServerMessageKind::Diff => {
                let indices = message.diff_indices()?;
                let value = message.value();
                let count = indices.len();
                for index in indices {
                    store.set(index, value);
                }
                viewport.request_refresh();
                self.stats.cells_applied += count as u64;
                trace!(target = "client::dispatch", count, value, "diff applied");
                Dispatched::Diff { count, value }
            }
        };
        self.stats.messages += 1;
        Ok(outcome)
    }
}
