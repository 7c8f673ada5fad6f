//! Cycle-counted fault debouncing.

/// Tracks how many consecutive cycles a condition has been active.
///
/// The condition latches once it has been seen on `threshold` consecutive
/// cycles and clears on the first cycle it is absent.
#[derive(Debug, Clone, Copy)]
pub struct PersistentCondition {
    threshold: u32,
    active_cycles: u32,
}

impl PersistentCondition {
    /// `threshold` of 0 is treated as 1.
    pub const fn new(threshold: u32) -> Self {
        Self {
            threshold: if threshold == 0 { 1 } else { threshold },
            active_cycles: 0,
        }
    }

    /// Record one cycle. Returns `true` while the condition is latched.
    #[inline]
    pub fn observe(&mut self, condition_active: bool) -> bool {
        if condition_active {
            self.active_cycles = self.active_cycles.saturating_add(1);
        } else {
            self.active_cycles = 0;
        }
        self.is_latched()
    }

    #[inline]
    pub const fn is_latched(&self) -> bool {
        self.active_cycles >= self.threshold
    }

    /// Consecutive active cycles so far.
    pub const fn active_cycles(&self) -> u32 {
        self.active_cycles
    }

    pub fn reset(&mut self) {
        self.active_cycles = 0;
    }
}
