//! Rendering collaborator used by the windowing controller.
//!
//! A surface owns whatever backs a slot (a terminal cell, a widget) and knows
//! nothing about logical indices beyond what a presented frame tells it.

use std::collections::HashMap;
use std::io;

use super::viewport::{PoolSlot, WindowLayout};

/// Opaque reference to one pooled view element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotHandle(pub u32);

/// Scroll container dimensions in surface units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusLine {
    pub connection: &'static str,
    pub checked: usize,
    pub total: usize,
    pub notice: Option<&'static str>,
}

impl Default for StatusLine {
    fn default() -> Self {
        Self {
            connection: "connecting",
            checked: 0,
            total: 0,
            notice: None,
        }
    }
}

/// Everything a surface needs to draw one finished frame.
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    pub layout: WindowLayout,
    pub slots: &'a [PoolSlot],
    pub status: StatusLine,
}

pub trait ViewSurface {
    fn measure(&self) -> SurfaceSize;
    /// Told about a new size by the input side. Surfaces that measure a
    /// real terminal may ignore it.
    fn resize(&mut self, size: SurfaceSize);
    fn create_slot(&mut self) -> SlotHandle;
    fn destroy_slot(&mut self, handle: SlotHandle);
    fn set_slot_value(&mut self, handle: SlotHandle, value: bool);
    fn set_slot_visible(&mut self, handle: SlotHandle, visible: bool);
    fn present(&mut self, frame: &FrameView<'_>) -> io::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SlotState {
    pub value: bool,
    pub visible: bool,
}

/// In-memory surface for headless runs and tests.
#[derive(Debug, Default)]
pub struct HeadlessSurface {
    size: SurfaceSize,
    slots: HashMap<SlotHandle, SlotState>,
    next_handle: u32,
    created: usize,
    destroyed: usize,
    presents: usize,
    last_cells: Vec<(usize, bool)>,
    last_status: Option<StatusLine>,
}

impl HeadlessSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: SurfaceSize::new(width, height),
            ..Self::default()
        }
    }

    pub fn slot(&self, handle: SlotHandle) -> Option<SlotState> {
        self.slots.get(&handle).copied()
    }

    pub fn live_slots(&self) -> usize {
        self.slots.len()
    }

    pub fn created(&self) -> usize {
        self.created
    }

    pub fn destroyed(&self) -> usize {
        self.destroyed
    }

    pub fn presents(&self) -> usize {
        self.presents
    }

    /// `(index, value)` of every visible slot in the last presented frame.
    pub fn visible_cells(&self) -> &[(usize, bool)] {
        &self.last_cells
    }

    pub fn last_status(&self) -> Option<StatusLine> {
        self.last_status
    }
}

impl ViewSurface for HeadlessSurface {
    fn measure(&self) -> SurfaceSize {
        self.size
    }

    fn resize(&mut self, size: SurfaceSize) {
        self.size = size;
    }

    fn create_slot(&mut self) -> SlotHandle {
        let handle = SlotHandle(self.next_handle);
        self.next_handle = self.next_handle.wrapping_add(1);
        self.slots.insert(handle, SlotState::default());
        self.created += 1;
        handle
    }

    fn destroy_slot(&mut self, handle: SlotHandle) {
        if self.slots.remove(&handle).is_some() {
            self.destroyed += 1;
        }
    }

    fn set_slot_value(&mut self, handle: SlotHandle, value: bool) {
        if let Some(slot) = self.slots.get_mut(&handle) {
            slot.value = value;
        }
    }

    fn set_slot_visible(&mut self, handle: SlotHandle, visible: bool) {
        if let Some(slot) = self.slots.get_mut(&handle) {
            slot.visible = visible;
        }
    }

    fn present(&mut self, frame: &FrameView<'_>) -> io::Result<()> {
        self.presents += 1;
        self.last_status = Some(frame.status);
        self.last_cells = frame
            .slots
            .iter()
            .filter_map(|slot| {
                let state = self.slots.get(&slot.handle)?;
                state.visible.then_some((slot.index, state.value))
            })
            .collect();
        Ok(())
    }
}
