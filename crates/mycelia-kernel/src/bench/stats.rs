//! Throughput and latency-percentile helpers.

use std::time::Duration;

use hdrhistogram::Histogram;

use mycelia_core::error::{MyceliaError, Result};

/// Upper bound of a recordable latency: one minute, in microseconds.
const MAX_LATENCY_US: u64 = 60_000_000;

/// Operations per second; 0 when nothing was measured.
pub fn per_sec(ops: usize, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if ops == 0 || secs <= 0.0 {
        return 0.0;
    }
    ops as f64 / secs
}

/// Latency recorder with microsecond resolution and three significant
/// digits. Values above one minute are clamped.
#[derive(Debug, Clone)]
pub struct LatencyHistogram {
    hist: Histogram<u64>,
}

impl LatencyHistogram {
    pub fn new() -> Result<Self> {
        let hist = Histogram::new_with_bounds(1, MAX_LATENCY_US, 3)
            .map_err(|e| MyceliaError::Internal(format!("latency histogram bounds: {e:?}")))?;
        Ok(Self { hist })
    }

    pub fn record(&mut self, d: Duration) {
        let us = u64::try_from(d.as_micros()).unwrap_or(u64::MAX).max(1);
        self.hist.saturating_record(us);
    }

    /// Fold another recorder's samples into this one.
    pub fn merge(&mut self, other: &Self) -> Result<()> {
        self.hist
            .add(&other.hist)
            .map_err(|e| MyceliaError::Internal(format!("latency histogram merge: {e:?}")))
    }

    pub fn len(&self) -> u64 {
        self.hist.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hist.is_empty()
    }

    /// Value at quantile `q` (`0.0..=1.0`) in milliseconds; 0 when empty.
    pub fn quantile_ms(&self, q: f64) -> f64 {
        if self.hist.is_empty() {
            return 0.0;
        }
        self.hist.value_at_quantile(q.clamp(0.0, 1.0)) as f64 / 1_000.0
    }
}
