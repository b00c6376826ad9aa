//! Poll tick timing (fetch + evaluate), in milliseconds.

use std::sync::Mutex;
use std::time::Duration;

/// Recorded by the poller, read by the `/health` handler.
pub struct TickLatency {
    inner: Mutex<hdrhistogram::Histogram<u64>>,
}

/// `(p50, p95, p99)` in milliseconds.
pub type Percentiles = (Option<u64>, Option<u64>, Option<u64>);

impl TickLatency {
    /// Tracks 1ms to 10min, 3 significant figures.
    pub fn new() -> Self {
        let histogram = hdrhistogram::Histogram::new_with_bounds(1, 600_000, 3)
            .expect("valid histogram bounds");
        Self {
            inner: Mutex::new(histogram),
        }
    }

    pub fn record(&self, d: Duration) {
        let ms = d.as_millis().clamp(1, 600_000) as u64;
        if let Ok(mut h) = self.inner.lock() {
            let _ = h.record(ms);
        }
    }

    pub fn percentiles(&self) -> Percentiles {
        let Ok(h) = self.inner.lock() else {
            return (None, None, None);
        };
        if h.len() == 0 {
            return (None, None, None);
        }
        (
            Some(h.value_at_quantile(0.5)),
            Some(h.value_at_quantile(0.95)),
            Some(h.value_at_quantile(0.99)),
        )
    }

    pub fn len(&self) -> u64 {
        self.inner.lock().map(|h| h.len()).unwrap_or(0)
    }
}

impl Default for TickLatency {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_histogram_has_no_percentiles() {
        let latency = TickLatency::new();
        assert_eq!(latency.percentiles(), (None, None, None));
        assert_eq!(latency.len(), 0);
    }

    #[test]
    fn records_sub_millisecond_ticks_as_one_ms() {
        let latency = TickLatency::new();
        latency.record(Duration::from_micros(200));
        latency.record(Duration::from_millis(40));

        assert_eq!(latency.len(), 2);
        let (p50, _, p99) = latency.percentiles();
        assert_eq!(p50, Some(1));
        assert!(p99.is_some_and(|v| (39..=41).contains(&v)), "p99={p99:?}");
    }
}
