//! Timing helpers for the polling loop.

use bpc_traits::Clock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Granularity of interruptible waits; bounds the extra cancellation
/// latency added by any single settle delay.
pub const WAIT_SLICE: Duration = Duration::from_millis(25);

/// Sleep up to `total`, returning early once `cancel` is raised.
pub fn wait_cancellable(clock: &dyn Clock, total: Duration, cancel: &AtomicBool) {
    let mut remaining = total;
    while !remaining.is_zero() {
        if cancel.load(Ordering::Relaxed) {
            return;
        }
        let slice = remaining.min(WAIT_SLICE);
        clock.sleep(slice);
        remaining = remaining.saturating_sub(slice);
    }
}

/// Clock whose sleeps observe a cancellation flag, so device settle
/// delays cannot pin a shutting-down loop for their full duration.
#[derive(Clone)]
pub struct CancellableClock {
    inner: Arc<dyn Clock + Send + Sync>,
    cancel: Arc<AtomicBool>,
}

impl CancellableClock {
    pub fn new(inner: Arc<dyn Clock + Send + Sync>, cancel: Arc<AtomicBool>) -> Self {
        Self { inner, cancel }
    }
}

impl Clock for CancellableClock {
    fn now(&self) -> Instant {
        self.inner.now()
    }

    fn sleep(&self, d: Duration) {
        wait_cancellable(&*self.inner, d, &self.cancel);
    }
}
