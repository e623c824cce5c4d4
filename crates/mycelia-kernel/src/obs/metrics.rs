//! Minimal metrics registry for the kernel.
//!
//! Counter/gauge/histogram vectors with dynamic labels backed by `DashMap`.
//! Labels are flattened into sorted key vectors for deterministic identity.
//! Histogram buckets are fixed in microseconds to avoid floating point math.

use dashmap::DashMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

type LabelKey = Vec<(String, String)>;

fn label_key(labels: &[(&str, &str)]) -> LabelKey {
    let mut key: LabelKey = labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    key.sort();
    key
}

fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

fn render_labels(key: &LabelKey) -> String {
    key.iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label(v)))
        .collect::<Vec<_>>()
        .join(",")
}

fn sample_line(out: &mut String, name: &str, labels: &str, value: impl std::fmt::Display) {
    if labels.is_empty() {
        let _ = writeln!(out, "{name} {value}");
    } else {
        let _ = writeln!(out, "{name}{{{labels}}} {value}");
    }
}

#[derive(Default)]
pub struct CounterVec {
    map: DashMap<LabelKey, AtomicU64>,
}

impl CounterVec {
    pub fn inc(&self, labels: &[(&str, &str)]) {
        self.add(labels, 1);
    }

    pub fn add(&self, labels: &[(&str, &str)], v: u64) {
        if v == 0 {
            return;
        }
        self.map
            .entry(label_key(labels))
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(v, Ordering::Relaxed);
    }

    /// Current value for an exact label set (0 if never touched).
    pub fn get(&self, labels: &[(&str, &str)]) -> u64 {
        self.map
            .get(&label_key(labels))
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn render(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "# TYPE {name} counter");
        for r in self.map.iter() {
            sample_line(out, name, &render_labels(r.key()), r.value().load(Ordering::Relaxed));
        }
    }
}

#[derive(Default)]
pub struct GaugeVec {
    map: DashMap<LabelKey, AtomicI64>,
}

impl GaugeVec {
    pub fn inc(&self, labels: &[(&str, &str)]) { self.add(labels, 1); }
    pub fn dec(&self, labels: &[(&str, &str)]) { self.add(labels, -1); }

    pub fn add(&self, labels: &[(&str, &str)], v: i64) {
        self.map
            .entry(label_key(labels))
            .or_insert_with(|| AtomicI64::new(0))
            .fetch_add(v, Ordering::Relaxed);
    }

    pub fn get(&self, labels: &[(&str, &str)]) -> i64 {
        self.map
            .get(&label_key(labels))
            .map(|g| g.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn render(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "# TYPE {name} gauge");
        for r in self.map.iter() {
            sample_line(out, name, &render_labels(r.key()), r.value().load(Ordering::Relaxed));
        }
    }
}

// 10us, 50us, 100us, 500us, 1ms, 5ms, 10ms, 50ms, 100ms, 1s
const BUCKETS_MICROS: [u64; 10] = [
    10, 50, 100, 500, 1_000, 5_000, 10_000, 50_000, 100_000, 1_000_000,
];

#[derive(Default)]
struct AtomicHistogram {
    count: AtomicU64,
    sum: AtomicU64,
    buckets: [AtomicU64; BUCKETS_MICROS.len()],
}

#[derive(Default)]
pub struct HistogramVec {
    map: DashMap<LabelKey, AtomicHistogram>,
}

impl HistogramVec {
    /// Observe a duration into cumulative buckets (microsecond scale).
    pub fn observe(&self, labels: &[(&str, &str)], duration: Duration) {
        let hist = self
            .map
            .entry(label_key(labels))
            .or_insert_with(AtomicHistogram::default);
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);

        hist.count.fetch_add(1, Ordering::Relaxed);
        hist.sum.fetch_add(micros, Ordering::Relaxed);

        for (i, &b) in BUCKETS_MICROS.iter().enumerate() {
            if micros <= b {
                hist.buckets[i].fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn count(&self, labels: &[(&str, &str)]) -> u64 {
        self.map
            .get(&label_key(labels))
            .map(|h| h.count.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Render in Prometheus text format (unit: microseconds).
    fn render(&self, name: &str, out: &mut String) {
        let _ = writeln!(out, "# TYPE {name} histogram");
        for r in self.map.iter() {
            let hist = r.value();
            let label_str = render_labels(r.key());
            let prefix = if label_str.is_empty() { String::new() } else { format!("{label_str},") };

            for (i, &le) in BUCKETS_MICROS.iter().enumerate() {
                let count = hist.buckets[i].load(Ordering::Relaxed);
                let _ = writeln!(out, "{name}_bucket{{{prefix}le=\"{le}\"}} {count}");
            }
            let count = hist.count.load(Ordering::Relaxed);
            let _ = writeln!(out, "{name}_bucket{{{prefix}le=\"+Inf\"}} {count}");
            sample_line(out, &format!("{name}_sum"), &label_str, hist.sum.load(Ordering::Relaxed));
            sample_line(out, &format!("{name}_count"), &label_str, count);
        }
    }
}

#[derive(Default)]
pub struct KernelMetrics {
    /// Point-to-point sends by outcome (`ok` / error code).
    pub messages_sent: CounterVec,
    pub messages_published: CounterVec,
    /// Fan-out deliveries by outcome (`delivered` / `dropped` / `failed`).
    pub deliveries: CounterVec,
    pub routing_errors: CounterVec,
    pub subscriptions_active: GaugeVec,
    pub dispatch_duration: HistogramVec, // In Microseconds
    draining: AtomicBool,
}

impl KernelMetrics {
    pub fn set_draining(&self) { self.draining.store(true, Ordering::Relaxed); }
    pub fn is_draining(&self) -> bool { self.draining.load(Ordering::Relaxed) }

    /// Render all registered metrics plus any extra lines provided by callers.
    pub fn render(&self, extra: &[(&str, u64)]) -> String {
        let mut out = String::new();
        self.messages_sent.render("mycelia_messages_sent_total", &mut out);
        self.messages_published.render("mycelia_messages_published_total", &mut out);
        self.deliveries.render("mycelia_deliveries_total", &mut out);
        self.routing_errors.render("mycelia_routing_errors_total", &mut out);
        self.subscriptions_active.render("mycelia_subscriptions_active", &mut out);
        self.dispatch_duration.render("mycelia_dispatch_duration_micros", &mut out);

        let _ = writeln!(
            out,
            "# TYPE mycelia_draining gauge\nmycelia_draining {}",
            u8::from(self.is_draining())
        );
        for (k, v) in extra {
            let _ = writeln!(out, "{k} {v}");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_ignore_label_order() {
        let c = CounterVec::default();
        c.inc(&[("a", "1"), ("b", "2")]);
        c.add(&[("b", "2"), ("a", "1")], 4);
        assert_eq!(c.get(&[("a", "1"), ("b", "2")]), 5);
        assert_eq!(c.get(&[("a", "x")]), 0);
    }

    #[test]
    fn histogram_buckets_are_cumulative() {
        let h = HistogramVec::default();
        h.observe(&[("op", "send")], Duration::from_micros(40));
        h.observe(&[("op", "send")], Duration::from_millis(2));
        assert_eq!(h.count(&[("op", "send")]), 2);

        let mut out = String::new();
        h.render("lat", &mut out);
        assert!(out.contains("lat_bucket{op=\"send\",le=\"10\"} 0"));
        assert!(out.contains("lat_bucket{op=\"send\",le=\"50\"} 1"));
        assert!(out.contains("lat_bucket{op=\"send\",le=\"5000\"} 2"));
        assert!(out.contains("lat_bucket{op=\"send\",le=\"+Inf\"} 2"));
        assert!(out.contains("lat_sum{op=\"send\"} 2040"));
    }

    #[test]
    fn render_includes_draining_and_extra() {
        let m = KernelMetrics::default();
        m.messages_sent.inc(&[("outcome", "ok")]);
        m.set_draining();
        let out = m.render(&[("mycelia_routes", 3)]);
        assert!(out.contains("mycelia_messages_sent_total{outcome=\"ok\"} 1"));
        assert!(out.contains("mycelia_draining 1"));
        assert!(out.contains("mycelia_routes 3"));
    }
}
