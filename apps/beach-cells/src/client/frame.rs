/// Per-frame coalescing of remap requests.
///
/// Any number of scroll or refresh requests between two frame ticks collapse
/// into a single pending remap; the most recent offset wins.
#[derive(Debug, Default, Clone)]
pub struct FrameScheduler {
    pending: Option<u32>,
    coalesced: u64,
    frames: u64,
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when this request scheduled a new frame and `false` when
    /// it was folded into one already pending.
    pub fn request(&mut self, offset: u32) -> bool {
        let fresh = self.pending.is_none();
        if !fresh {
            self.coalesced += 1;
        }
        self.pending = Some(offset);
        fresh
    }

    pub fn take(&mut self) -> Option<u32> {
        let offset = self.pending.take()?;
        self.frames += 1;
        Some(offset)
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn coalesced(&self) -> u64 {
        self.coalesced
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}
