//! Kernel handle: point-to-point send, QoS fan-out, and drain.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures_util::stream::FuturesUnordered;
use futures_util::StreamExt;
use tokio::time::Duration;

use mycelia_core::error::{MyceliaError, Result};
use mycelia_core::message::{Message, MessageId, Payload};
use mycelia_core::path::Params;
use mycelia_core::scope::ScopeRule;

use crate::config::KernelSection;
use crate::kernel::subscriptions::{SubscriptionId, SubscriptionRegistry};
use crate::kernel::types::{PublishReport, QoS};
use crate::obs::KernelMetrics;
use crate::queue::{EnqueueOutcome, MessageQueue};
use crate::routing::{MessageHandler, MessageRouter, RouteId};

struct KernelInner {
    cfg: KernelSection,
    router: MessageRouter,
    subscriptions: SubscriptionRegistry,
    metrics: Arc<KernelMetrics>,
    next_id: AtomicU64,
    draining: AtomicBool,
}

/// Kernel handle: route table + subscriptions + egress. Cheap to clone.
#[derive(Clone)]
pub struct Kernel {
    inner: Arc<KernelInner>,
}

impl Kernel {
    pub fn new(cfg: KernelSection, metrics: Arc<KernelMetrics>) -> Self {
        Self {
            inner: Arc::new(KernelInner {
                cfg,
                router: MessageRouter::new(),
                subscriptions: SubscriptionRegistry::new(),
                metrics,
                next_id: AtomicU64::new(1),
                draining: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &KernelSection { &self.inner.cfg }
    pub fn router(&self) -> &MessageRouter { &self.inner.router }
    pub fn subscriptions(&self) -> &SubscriptionRegistry { &self.inner.subscriptions }
    pub fn metrics(&self) -> &KernelMetrics { &self.inner.metrics }

    /// Build a message with the next kernel-wide id.
    pub fn message(&self, path: &str, payload: Payload) -> Result<Message> {
        Ok(self.stamp(Message::new(path, payload)?))
    }

    /// Assign an id to a message built elsewhere (e.g. decoded from an envelope).
    pub fn stamp(&self, msg: Message) -> Message {
        if msg.id != MessageId::default() {
            return msg;
        }
        msg.with_id(MessageId(self.inner.next_id.fetch_add(1, Ordering::Relaxed)))
    }

    pub fn route(&self, pattern: &str, handler: Arc<dyn MessageHandler>) -> Result<RouteId> {
        self.inner.router.register(pattern, handler, None)
    }

    pub fn route_scoped(
        &self,
        pattern: &str,
        scope: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<RouteId> {
        let rule = ScopeRule::parse(scope)?;
        self.inner.router.register(pattern, handler, Some(rule))
    }

    pub fn subscribe(
        &self,
        subscriber: &str,
        pattern: &str,
    ) -> Result<(SubscriptionId, Arc<MessageQueue>)> {
        if self.is_draining() {
            return Err(MyceliaError::NotAllowed("draining".into()));
        }
        let cfg = &self.inner.cfg;
        let (id, inbox) = self.inner.subscriptions.subscribe(subscriber, pattern, || {
            MessageQueue::new(cfg.inbox_capacity, cfg.overflow)
        })?;
        // drain() may have run close_all() before this inbox was registered
        if self.is_draining() {
            self.inner.subscriptions.unsubscribe(id);
            inbox.close();
            return Err(MyceliaError::NotAllowed("draining".into()));
        }
        self.inner.metrics.subscriptions_active.inc(&[]);
        tracing::debug!(
            %subscriber,
            %pattern,
            sub = %id,
            overflow = ?inbox.overflow(),
            "subscribed"
        );
        Ok((id, inbox))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.inner.subscriptions.unsubscribe(id);
        if removed {
            self.inner.metrics.subscriptions_active.dec(&[]);
        }
        removed
    }

    pub fn remove_subscriber(&self, subscriber: &str) -> usize {
        let n = self.inner.subscriptions.remove_subscriber(subscriber);
        self.inner
            .metrics
            .subscriptions_active
            .add(&[], -i64::try_from(n).unwrap_or(i64::MAX));
        n
    }

    fn check_open(&self) -> Result<()> {
        if self.is_draining() {
            return Err(MyceliaError::NotAllowed("draining".into()));
        }
        Ok(())
    }

    /// Route `msg` to exactly one handler and run it.
    pub async fn send(&self, msg: Message) -> Result<()> {
        self.check_open()?;
        let msg = self.stamp(msg);
        let started = Instant::now();

        let res = match self.inner.router.resolve(&msg) {
            Ok(m) => {
                let ctx = KernelCtx::new(self.clone(), m.params, m.route);
                m.handler.handle(ctx, msg).await
            }
            Err(e) => {
                self.inner
                    .metrics
                    .routing_errors
                    .inc(&[("code", e.code().as_str())]);
                tracing::debug!(path = %msg.path, error = %e, "route resolve failed");
                Err(e)
            }
        };

        let metrics = &self.inner.metrics;
        metrics.dispatch_duration.observe(&[("op", "send")], started.elapsed());
        let outcome = match &res {
            Ok(()) => "ok",
            Err(e) => e.code().as_str(),
        };
        metrics.messages_sent.inc(&[("outcome", outcome)]);
        res
    }

    /// Fan `msg` out to every matching subscriber inbox.
    pub async fn publish(&self, msg: Message, qos: QoS) -> Result<PublishReport> {
        self.check_open()?;
        let msg = self.stamp(msg);
        let started = Instant::now();

        let targets = self.inner.subscriptions.matching(&msg.path);
        let mut report = PublishReport {
            matched: targets.len(),
            ..PublishReport::default()
        };

        match qos {
            QoS::Lossy => {
                for (subscriber, inbox) in targets {
                    match inbox.enqueue(msg.clone()) {
                        Ok(EnqueueOutcome::Accepted) => report.delivered += 1,
                        Ok(EnqueueOutcome::Dropped(_)) => report.dropped += 1,
                        Ok(EnqueueOutcome::Evicted(_)) => {
                            report.delivered += 1;
                            report.dropped += 1;
                        }
                        Err(e) => {
                            tracing::debug!(%subscriber, error = %e, "lossy delivery failed");
                            report.failed += 1;
                        }
                    }
                }
            }
            QoS::Reliable { timeout_ms } => {
                let timeout = Duration::from_millis(timeout_ms);
                let mut futs = FuturesUnordered::new();
                for (subscriber, inbox) in targets {
                    let m = msg.clone();
                    futs.push(async move {
                        let r = inbox.enqueue_wait(m, timeout).await;
                        (subscriber, r)
                    });
                }
                while let Some((subscriber, r)) = futs.next().await {
                    match r {
                        Ok(()) => report.delivered += 1,
                        Err(e) => {
                            tracing::debug!(%subscriber, error = %e, "reliable delivery failed");
                            report.failed += 1;
                        }
                    }
                }
            }
        }

        let metrics = &self.inner.metrics;
        metrics.dispatch_duration.observe(&[("op", "publish")], started.elapsed());
        metrics.messages_published.inc(&[]);
        metrics.deliveries.add(&[("outcome", "delivered")], report.delivered as u64);
        metrics.deliveries.add(&[("outcome", "dropped")], report.dropped as u64);
        metrics.deliveries.add(&[("outcome", "failed")], report.failed as u64);

        Ok(report)
    }

    /// Publish with the configured reliable timeout.
    pub async fn publish_reliable(&self, msg: Message) -> Result<PublishReport> {
        let timeout_ms = self.inner.cfg.reliable_timeout_ms;
        self.publish(msg, QoS::Reliable { timeout_ms }).await
    }

    /// Reject new traffic and close every inbox. Queued messages stay readable.
    pub fn drain(&self) {
        if self.inner.draining.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.metrics.set_draining();
        self.inner.subscriptions.close_all();
        tracing::info!(
            subscribers = self.inner.subscriptions.subscriber_count(),
            "kernel draining"
        );
    }

    pub fn is_draining(&self) -> bool {
        self.inner.draining.load(Ordering::SeqCst)
    }
}

/// Per-message context passed to handlers.
#[derive(Clone)]
pub struct KernelCtx {
    kernel: Kernel,
    params: Arc<Params>,
    route: RouteId,
}

impl KernelCtx {
    pub fn new(kernel: Kernel, params: Params, route: RouteId) -> Self {
        Self {
            kernel,
            params: Arc::new(params),
            route,
        }
    }

    pub fn kernel(&self) -> &Kernel { &self.kernel }
    pub fn param(&self, name: &str) -> Option<&str> { self.params.get(name) }
    pub fn route(&self) -> RouteId { self.route }

    pub async fn send(&self, msg: Message) -> Result<()> {
        self.kernel.send(msg).await
    }

    pub async fn publish(&self, msg: Message, qos: QoS) -> Result<PublishReport> {
        self.kernel.publish(msg, qos).await
    }
}
