use serde::Serialize;

/// Quality-of-Service strategy for fan-out delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QoS {
    /// Latency-critical: never wait; a full inbox applies its overflow policy.
    #[default]
    Lossy,
    /// Reliability-critical: wait for inbox space, optionally time out.
    /// `timeout_ms == 0` waits indefinitely.
    Reliable { timeout_ms: u64 },
}

/// Per-publish delivery summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    /// Inboxes whose subscriptions matched the path.
    pub matched: usize,
    /// Inboxes that accepted the message.
    pub delivered: usize,
    /// Messages discarded by overflow (incoming or evicted).
    pub dropped: usize,
    /// Inboxes that refused (closed, full with `reject`, or timed out).
    pub failed: usize,
}
