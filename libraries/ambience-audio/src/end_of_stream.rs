use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Fires once when playback enters the last `offset` of a track
///
/// Firing early leaves room for a crossfade before true silence.
#[derive(Debug)]
pub struct EndOfStreamLatch {
    offset: Duration,
    fired: AtomicBool,
}

impl EndOfStreamLatch {
    pub fn new(offset: Duration) -> Self {
        Self {
            offset,
            fired: AtomicBool::new(false),
        }
    }

    /// Returns `true` on the first observation at or past the threshold and
    /// `false` on every call after that.
    pub fn observe(&self, position: Duration, total: Duration) -> bool {
        if total.is_zero() {
            return false;
        }
        if position >= total.saturating_sub(self.offset) {
            return self.fire();
        }
        false
    }

    /// Fire regardless of position (decoder reached true end of stream)
    pub fn fire(&self) -> bool {
        !self.fired.swap(true, Ordering::AcqRel)
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}
