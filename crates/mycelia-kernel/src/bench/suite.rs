//! Benchmark stages and report assembly.

use std::hint::black_box;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;

use mycelia_core::error::{MyceliaError, Result};
use mycelia_core::message::{Message, MessageId, Payload};
use mycelia_core::report::{BenchReport, Metric, ReportHeader, ReportSection};
use mycelia_core::scope::ScopeRule;

use crate::bench::probe::{os_description, MemoryProbe, SysinfoProbe};
use crate::bench::stats::{per_sec, LatencyHistogram};
use crate::bench::{SECTION_E2E, SECTION_LATENCY, SECTION_MEMORY, SECTION_QUEUE, SECTION_ROUTING};
use crate::config::{BenchSection, KernelSection, MyceliaConfig, ReportConfig};
use crate::kernel::{Kernel, QoS};
use crate::obs::KernelMetrics;
use crate::queue::{MessageQueue, OverflowPolicy};
use crate::routing::{MessageHandler, MessageRouter};
use crate::services::CountingHandler;

const BENCH_SCOPE: &str = "bench:read";
const MIB: f64 = 1024.0 * 1024.0;

/// Runs every benchmark stage and assembles the report.
#[derive(Clone)]
pub struct BenchSuite {
    bench: BenchSection,
    kernel: KernelSection,
    report: ReportConfig,
    probe: Arc<dyn MemoryProbe>,
}

struct EndToEnd {
    send: Duration,
    publish: Duration,
    deliveries: usize,
    latency: LatencyHistogram,
}

impl BenchSuite {
    pub fn new(cfg: &MyceliaConfig) -> Self {
        Self {
            bench: cfg.bench.clone(),
            kernel: cfg.kernel.clone(),
            report: cfg.report.clone(),
            probe: Arc::new(SysinfoProbe),
        }
    }

    pub fn with_probe(mut self, probe: Arc<dyn MemoryProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub async fn run(&self) -> Result<BenchReport> {
        let n = self.bench.iterations;
        tracing::info!(
            iterations = n,
            subscribers = self.bench.subscribers,
            routes = self.bench.routes,
            payload_bytes = self.bench.payload_bytes,
            "bench starting"
        );

        // Memory first: RSS rarely shrinks, so later stages would mask growth.
        // The synchronous stages stay off the async workers.
        let stages = self.clone();
        let (memory, queue, routing) = tokio::task::spawn_blocking(move || -> Result<_> {
            Ok((stages.memory()?, stages.queue_ops()?, stages.routing()?))
        })
        .await
        .map_err(|e| MyceliaError::Internal(format!("bench stage task failed: {e}")))??;
        let e2e = self.end_to_end().await?;

        let mut e2e_section = ReportSection::new(SECTION_E2E);
        e2e_section
            .push(Metric::new("Send", per_sec(n, e2e.send), "msg/sec", 0))
            .push(Metric::new("Publish", per_sec(n, e2e.publish), "msg/sec", 0))
            .push(Metric::new(
                "Delivered",
                per_sec(e2e.deliveries, e2e.publish),
                "msg/sec",
                0,
            ));

        let mut latency = ReportSection::new(SECTION_LATENCY);
        for (label, q) in [("p50", 0.50), ("p95", 0.95), ("p99", 0.99), ("p999", 0.999)] {
            latency.push(Metric::new(label, e2e.latency.quantile_ms(q), "ms", 3));
        }

        tracing::info!(samples = e2e.latency.len(), "bench finished");

        Ok(BenchReport {
            header: self.header(),
            sections: vec![queue, routing, e2e_section, memory, latency],
            status: self.report.status.to_block(),
        })
    }

    fn header(&self) -> ReportHeader {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        ReportHeader {
            title: self.report.title.clone(),
            date: chrono::Local::now().format("%Y-%m-%d").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            runtime: format!("rust/tokio {} ({cpus} cpus)", std::env::consts::ARCH),
            os: os_description(),
        }
    }

    fn shared_payload(&self) -> Payload {
        Payload::Bytes(Bytes::from(vec![0xAB; self.bench.payload_bytes]))
    }

    fn queue_ops(&self) -> Result<ReportSection> {
        let n = self.bench.iterations;
        let payload = self.shared_payload();
        let msgs = (0..n)
            .map(|i| -> Result<Message> {
                Ok(Message::new("bench/queue", payload.clone())?.with_id(MessageId(i as u64)))
            })
            .collect::<Result<Vec<_>>>()?;

        let q = MessageQueue::new(n, OverflowPolicy::Reject);

        let started = Instant::now();
        for m in msgs {
            q.enqueue(m)?;
        }
        let enqueue = started.elapsed();

        let started = Instant::now();
        let mut dequeued = 0usize;
        while let Some(m) = q.dequeue() {
            black_box(m);
            dequeued += 1;
        }
        let dequeue = started.elapsed();

        if dequeued != n {
            return Err(MyceliaError::Internal(format!(
                "queue bench dequeued {dequeued} of {n}"
            )));
        }
        tracing::info!(?enqueue, ?dequeue, "queue stage done");

        let mut s = ReportSection::new(SECTION_QUEUE);
        s.push(Metric::new("Enqueue", per_sec(n, enqueue), "ops/sec", 0))
            .push(Metric::new("Dequeue", per_sec(n, dequeue), "ops/sec", 0));
        Ok(s)
    }

    fn routing(&self) -> Result<ReportSection> {
        let n = self.bench.iterations;
        let routes = self.bench.routes;
        let router = MessageRouter::new();
        let sink: Arc<dyn MessageHandler> = Arc::new(CountingHandler::new());
        let scope = ScopeRule::parse(BENCH_SCOPE)?;

        for i in 0..routes {
            router.register(&format!("bench/static/{i}"), Arc::clone(&sink), None)?;
            router.register(&format!("bench/p{i}/{{id}}/items/{{item}}"), Arc::clone(&sink), None)?;
            router.register(&format!("bench/s{i}/{{id}}"), Arc::clone(&sink), Some(scope.clone()))?;
        }

        let build = |f: &dyn Fn(usize) -> String, scoped: bool| -> Result<Vec<Message>> {
            (0..n)
                .map(|i| -> Result<Message> {
                    let m = Message::new(&f(i), Payload::Empty)?;
                    Ok(if scoped { m.with_scopes([BENCH_SCOPE]) } else { m })
                })
                .collect()
        };
        let simple = build(&|i| format!("bench/static/{}", i % routes), false)?;
        let params = build(&|i| format!("bench/p{}/{i}/items/7", i % routes), false)?;
        let scoped = build(&|i| format!("bench/s{}/{i}", i % routes), true)?;

        let time = |msgs: &[Message]| -> Result<Duration> {
            let started = Instant::now();
            for m in msgs {
                black_box(router.resolve(m)?);
            }
            Ok(started.elapsed())
        };
        let simple_t = time(&simple)?;
        let params_t = time(&params)?;
        let scoped_t = time(&scoped)?;
        tracing::info!(?simple_t, ?params_t, ?scoped_t, "routing stage done");

        let mut s = ReportSection::new(SECTION_ROUTING);
        s.push(Metric::new("Simple Routes", per_sec(n, simple_t), "msg/sec", 0))
            .push(Metric::new("Parameterized Routes", per_sec(n, params_t), "msg/sec", 0))
            .push(Metric::new("With Scopes", per_sec(n, scoped_t), "msg/sec", 0));
        Ok(s)
    }

    async fn end_to_end(&self) -> Result<EndToEnd> {
        let n = self.bench.iterations;
        let k = self.bench.subscribers;
        let payload = self.shared_payload();
        let kernel = Kernel::new(self.kernel.clone(), Arc::new(KernelMetrics::default()));

        // send: point-to-point into a counting sink
        let sink = Arc::new(CountingHandler::new());
        kernel.route("bench/send", sink.clone())?;
        let started = Instant::now();
        for _ in 0..n {
            kernel.send(kernel.message("bench/send", payload.clone())?).await?;
        }
        let send = started.elapsed();
        let expected_bytes = (n * self.bench.payload_bytes) as u64;
        if sink.messages() != n as u64 || sink.bytes() != expected_bytes {
            return Err(MyceliaError::Internal(format!(
                "send bench handled {} of {n} messages, {} of {expected_bytes} bytes",
                sink.messages(),
                sink.bytes()
            )));
        }

        // publish: fan-out to k consumers, subscriber 0 samples latency
        let stride = (n / self.bench.latency_samples).max(1) as u64;
        let mut consumers = Vec::with_capacity(k);
        for s in 0..k {
            let (_, inbox) = kernel.subscribe(&format!("bench-sub-{s}"), "bench/events/**")?;
            let sample = s == 0;
            let mut latency = LatencyHistogram::new()?;
            consumers.push(tokio::spawn(async move {
                let mut received = 0usize;
                while let Some(m) = inbox.recv().await {
                    if sample && m.id.0 % stride == 0 {
                        latency.record(m.created_at.elapsed());
                    }
                    received += 1;
                }
                (received, latency)
            }));
        }

        let started = Instant::now();
        for _ in 0..n {
            let msg = kernel.message("bench/events/tick", payload.clone())?;
            let report = kernel.publish(msg, QoS::Reliable { timeout_ms: 0 }).await?;
            if report.failed > 0 {
                return Err(MyceliaError::Internal(format!(
                    "publish bench failed {} deliveries",
                    report.failed
                )));
            }
        }
        kernel.drain();

        let mut deliveries = 0usize;
        let mut latency = LatencyHistogram::new()?;
        for c in consumers {
            let (received, samples) = c
                .await
                .map_err(|e| MyceliaError::Internal(format!("consumer task failed: {e}")))?;
            deliveries += received;
            latency.merge(&samples)?;
        }
        let publish = started.elapsed();
        tracing::info!(?send, ?publish, deliveries, "end-to-end stage done");

        Ok(EndToEnd {
            send,
            publish,
            deliveries,
            latency,
        })
    }

    fn memory(&self) -> Result<ReportSection> {
        let n = self.bench.iterations;
        let before = self.probe.rss_bytes();

        let q = MessageQueue::new(n, OverflowPolicy::Reject);
        for i in 0..n {
            // fresh allocation per message so the payload is really resident
            let payload = Payload::Bytes(Bytes::from(vec![0xAB; self.bench.payload_bytes]));
            q.enqueue(Message::new("bench/memory", payload)?.with_id(MessageId(i as u64)))?;
        }
        let after = self.probe.rss_bytes();
        drop(q);

        let (before_mb, after_mb, per_msg) = match (before, after) {
            (Some(b), Some(a)) => (
                b as f64 / MIB,
                a as f64 / MIB,
                a.saturating_sub(b) as f64 / n as f64,
            ),
            _ => {
                tracing::warn!("memory probe unavailable; reporting zeros");
                (0.0, 0.0, 0.0)
            }
        };
        tracing::info!(before_mb, after_mb, per_msg, "memory stage done");

        let mut s = ReportSection::new(SECTION_MEMORY);
        s.push(Metric::new("RSS Before", before_mb, "MB", 2))
            .push(Metric::new("RSS After", after_mb, "MB", 2))
            .push(Metric::new("Per Message", per_msg, "bytes", 0));
        Ok(s)
    }
}
