//! Recompute coalescing.
//!
//! Every store mutation asks for a host recompute, but one logical event
//! may mutate several times. Requests made inside a `begin` / `end` batch
//! are coalesced and fired once when the outermost batch closes.

#[derive(Debug, Clone, Default)]
pub struct RecomputeScheduler {
    /// Batch nesting depth (0 = not batching).
    depth: usize,
    pending: bool,
    fired: u64,
}

impl RecomputeScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self) {
        self.depth += 1;
    }

    /// Ask for a recompute. Outside a batch this only marks it pending;
    /// the next outermost `end` (or `flush`) fires it.
    pub fn request(&mut self) {
        self.pending = true;
    }

    /// Close a batch. When the outermost batch closes with a pending
    /// request, `fire` runs exactly once. Returns whether it ran.
    pub fn end(&mut self, fire: impl FnOnce()) -> bool {
        if self.depth == 0 {
            log::debug!("recompute batch closed without being opened");
            return false;
        }
        self.depth -= 1;
        if self.depth == 0 {
            self.flush(fire)
        } else {
            false
        }
    }

    /// Fire a pending request now, unless a batch is still open.
    pub fn flush(&mut self, fire: impl FnOnce()) -> bool {
        if self.depth > 0 || !self.pending {
            return false;
        }
        self.pending = false;
        self.fired += 1;
        log::trace!("scheduling recompute #{}", self.fired);
        fire();
        true
    }

    pub fn is_batching(&self) -> bool {
        self.depth > 0
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Recomputes fired over the scheduler's lifetime.
    pub fn fired(&self) -> u64 {
        self.fired
    }
}
