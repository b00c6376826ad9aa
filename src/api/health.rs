//! Shared health state for the /health endpoint.
//! Updated by the alert poller and the notifier consumer.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct HealthState {
    /// Nanosecond timestamp of the last completed poll tick (0 = none).
    pub last_poll_at_ns: AtomicU64,
    pub polls_completed: AtomicU64,
    /// Ticks skipped because the market fetch failed.
    pub polls_failed: AtomicU64,
    /// Markets evaluated on the last completed tick.
    pub markets_evaluated: AtomicU64,
    pub alerts_fired: AtomicU64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_poll(&self, at_ns: u64, markets_evaluated: usize, alerts_fired: usize) {
        self.last_poll_at_ns.store(at_ns, Ordering::Relaxed);
        self.markets_evaluated
            .store(markets_evaluated as u64, Ordering::Relaxed);
        self.alerts_fired
            .fetch_add(alerts_fired as u64, Ordering::Relaxed);
        self.polls_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed_poll(&self) {
        self.polls_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn last_poll_at_ns(&self) -> u64 {
        self.last_poll_at_ns.load(Ordering::Relaxed)
    }

    pub fn polls_completed(&self) -> u64 {
        self.polls_completed.load(Ordering::Relaxed)
    }

    pub fn polls_failed(&self) -> u64 {
        self.polls_failed.load(Ordering::Relaxed)
    }

    pub fn markets_evaluated(&self) -> u64 {
        self.markets_evaluated.load(Ordering::Relaxed)
    }

    pub fn alerts_fired(&self) -> u64 {
        self.alerts_fired.load(Ordering::Relaxed)
    }
}
