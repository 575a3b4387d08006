//! Virtualized window over the logical cell space.
//!
//! A fixed pool of surface slots is rebound to whichever logical indices fall
//! inside the visible rows, so surface work scales with the viewport instead
//! of the total cell count.

use tracing::{debug, trace, warn};

use super::frame::FrameScheduler;
use super::surface::{SlotHandle, ViewSurface};
use crate::cache::BitStore;
use crate::protocol::{RangeError, encode_toggle_report};

/// Destination for encoded toggle reports.
pub trait ToggleSink {
    /// Fire-and-forget; `true` when the payload went out.
    fn send(&mut self, frame: &[u8]) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSlot {
    pub handle: SlotHandle,
    pub index: usize,
    pub visible: bool,
}

/// Geometry snapshot handed to the surface with each frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowLayout {
    pub columns: u32,
    pub visible_rows: u32,
    pub track_rows: u64,
    pub first_row: u64,
    pub offset: u32,
    pub cell_width: u32,
    pub cell_height: u32,
}

#[derive(Debug)]
pub struct ViewportWindow {
    cell_width: u32,
    cell_height: u32,
    overscan_rows: u32,
    columns: u32,
    visible_rows: u32,
    height: u32,
    track_rows: u64,
    first_row: u64,
    offset: u32,
    slots: Vec<PoolSlot>,
    scheduler: FrameScheduler,
    dirty: bool,
}

impl ViewportWindow {
    pub fn new(cell_width: u32, cell_height: u32, overscan_rows: u32) -> Self {
        Self {
            cell_width: cell_width.max(1),
            cell_height: cell_height.max(1),
            overscan_rows,
            columns: 1,
            visible_rows: 0,
            height: 0,
            track_rows: 0,
            first_row: 0,
            offset: 0,
            slots: Vec::new(),
            scheduler: FrameScheduler::new(),
            dirty: false,
        }
    }

    /// Recomputes the grid geometry. The slot pool is left untouched.
    pub fn recompute_layout(&mut self, width: u32, height: u32, total_bits: usize) {
        self.columns = (width / self.cell_width).max(1);
        self.visible_rows = height / self.cell_height;
        self.height = height;
        self.track_rows = (total_bits as u64).div_ceil(self.columns as u64);
        self.dirty = true;
        debug!(
            target = "client::viewport",
            columns = self.columns,
            visible_rows = self.visible_rows,
            track_rows = self.track_rows,
            "layout recomputed"
        );
    }

    pub fn capacity(&self) -> usize {
        (self.visible_rows as usize + self.overscan_rows as usize) * self.columns as usize
    }

    /// Rebuilds the slot pool, binding slot `i` to logical index `i`. The
    /// scroll offset is clamped to the current track before the refresh.
    pub fn populate<S, I>(&mut self, surface: &mut S, initial: I)
    where
        S: ViewSurface + ?Sized,
        I: ExactSizeIterator<Item = bool>,
    {
        for slot in self.slots.drain(..) {
            surface.destroy_slot(slot.handle);
        }
        let count = self.capacity().min(initial.len());
        for (index, value) in initial.take(count).enumerate() {
            let handle = surface.create_slot();
            surface.set_slot_value(handle, value);
            surface.set_slot_visible(handle, true);
            self.slots.push(PoolSlot {
                handle,
                index,
                visible: true,
            });
        }
        self.first_row = 0;
        let max = self.max_scroll_offset(self.height);
        if self.offset > max {
            debug!(target = "client::viewport", offset = self.offset, max, "offset clamped to track");
            self.offset = max;
        }
        debug!(target = "client::viewport", slots = count, "pool populated");
        self.mark_dirty();
        self.request_refresh();
    }

    /// Records the latest scroll offset; the remap runs on the next frame.
    pub fn on_scroll(&mut self, offset: u32) {
        self.offset = offset;
        if !self.scheduler.request(offset) {
            trace!(target = "client::viewport", offset, "scroll coalesced");
        }
    }

    pub fn request_refresh(&mut self) {
        self.scheduler.request(self.offset);
    }

    pub fn has_pending_frame(&self) -> bool {
        self.scheduler.is_pending()
    }

    pub fn coalesced_requests(&self) -> u64 {
        self.scheduler.coalesced()
    }

    /// Runs the pending remap, if any. Returns whether one ran.
    pub fn on_frame<S>(&mut self, surface: &mut S, store: &BitStore) -> bool
    where
        S: ViewSurface + ?Sized,
    {
        match self.scheduler.take() {
            Some(offset) => {
                self.remap(surface, offset, store);
                true
            }
            None => false,
        }
    }

    pub fn remap<S>(&mut self, surface: &mut S, offset: u32, store: &BitStore)
    where
        S: ViewSurface + ?Sized,
    {
        self.offset = offset;
        self.first_row = (offset / self.cell_height) as u64;
        let columns = self.columns as usize;
        let first = self.first_row as usize;
        let total = store.size();
        let mut hidden = 0usize;
        for (position, slot) in self.slots.iter_mut().enumerate() {
            let index = (first + position / columns) * columns + position % columns;
            slot.index = index;
            if index >= total {
                hidden += 1;
                if slot.visible {
                    surface.set_slot_visible(slot.handle, false);
                    slot.visible = false;
                }
                continue;
            }
            surface.set_slot_value(slot.handle, store.get(index));
            if !slot.visible {
                surface.set_slot_visible(slot.handle, true);
                slot.visible = true;
            }
        }
        self.dirty = true;
        trace!(
            target = "client::viewport",
            offset,
            first_row = self.first_row,
            hidden,
            "window remapped"
        );
    }

    /// Applies a local toggle: encode, update the store and the bound slot,
    /// then send. A range failure rejects the click before anything changes.
    pub fn on_click<S, T>(
        &mut self,
        surface: &mut S,
        store: &mut BitStore,
        sink: &mut T,
        index: usize,
        value: bool,
    ) -> Result<bool, RangeError>
    where
        S: ViewSurface + ?Sized,
        T: ToggleSink + ?Sized,
    {
        let payload = encode_toggle_report(index, value).inspect_err(|err| {
            warn!(target = "client::viewport", index, error = %err, "toggle rejected");
        })?;
        store.set(index, value);
        if let Some(slot) = self
            .slots
            .iter()
            .find(|slot| slot.visible && slot.index == index)
        {
            surface.set_slot_value(slot.handle, value);
            self.dirty = true;
        }
        let sent = sink.send(&payload);
        debug!(target = "client::viewport", index, value, sent, "toggle applied");
        Ok(sent)
    }

    /// Logical index of the visible slot under surface coordinates `(x, y)`.
    pub fn index_at(&self, x: u32, y: u32) -> Option<usize> {
        let column = x / self.cell_width;
        if column >= self.columns {
            return None;
        }
        let row = (self.first_row as usize) + (y / self.cell_height) as usize;
        let index = row * self.columns as usize + column as usize;
        self.slots
            .iter()
            .any(|slot| slot.visible && slot.index == index)
            .then_some(index)
    }

    pub fn max_scroll_offset(&self, height: u32) -> u32 {
        let track = self.track_rows.saturating_mul(self.cell_height as u64);
        u32::try_from(track.saturating_sub(height as u64)).unwrap_or(u32::MAX)
    }

    pub fn layout(&self) -> WindowLayout {
        WindowLayout {
            columns: self.columns,
            visible_rows: self.visible_rows,
            track_rows: self.track_rows,
            first_row: self.first_row,
            offset: self.offset,
            cell_width: self.cell_width,
            cell_height: self.cell_height,
        }
    }

    pub fn slots(&self) -> &[PoolSlot] {
        &self.slots
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn columns(&self) -> u32 {
        self.columns
    }

    pub fn visible_rows(&self) -> u32 {
        self.visible_rows
    }

    pub fn track_rows(&self) -> u64 {
        self.track_rows
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }
}
