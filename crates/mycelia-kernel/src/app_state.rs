//! Shared application state for the Mycelia server.
//!
//! Wires the kernel and metrics, registers built-in handlers, and holds the
//! most recent bench report for `/v1/report`.

use std::sync::{Arc, PoisonError, RwLock};

use mycelia_core::error::Result;

use crate::config::MyceliaConfig;
use crate::kernel::Kernel;
use crate::obs::KernelMetrics;
use crate::services::EchoService;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: MyceliaConfig,
    kernel: Kernel,
    metrics: Arc<KernelMetrics>,
    last_report: RwLock<Option<Arc<str>>>,
}

impl AppState {
    /// Build application state.
    /// Returns Result so main can handle errors gracefully (no panic).
    pub fn new(cfg: MyceliaConfig) -> Result<Self> {
        let metrics = Arc::new(KernelMetrics::default());
        let kernel = Kernel::new(cfg.kernel.clone(), Arc::clone(&metrics));

        let echo = Arc::new(EchoService::new());
        kernel.route(echo.pattern(), echo)?;

        tracing::info!(
            routes = kernel.router().route_count(),
            inbox_capacity = cfg.kernel.inbox_capacity,
            overflow = ?cfg.kernel.overflow,
            "kernel ready"
        );

        Ok(Self {
            inner: Arc::new(AppStateInner {
                cfg,
                kernel,
                metrics,
                last_report: RwLock::new(None),
            }),
        })
    }

    pub fn cfg(&self) -> &MyceliaConfig {
        &self.inner.cfg
    }

    pub fn kernel(&self) -> &Kernel {
        &self.inner.kernel
    }

    pub fn metrics(&self) -> &KernelMetrics {
        &self.inner.metrics
    }

    pub fn is_draining(&self) -> bool {
        self.inner.kernel.is_draining()
    }

    pub fn drain(&self) {
        self.inner.kernel.drain();
    }

    /// Gauges computed on scrape rather than tracked incrementally.
    pub fn metrics_extra(&self) -> Vec<(&'static str, u64)> {
        let k = &self.inner.kernel;
        vec![
            ("mycelia_routes", k.router().route_count() as u64),
            ("mycelia_subscribers", k.subscriptions().subscriber_count() as u64),
        ]
    }

    pub fn set_report(&self, text: String) {
        let mut g = self.inner.last_report.write().unwrap_or_else(PoisonError::into_inner);
        *g = Some(Arc::from(text));
    }

    pub fn last_report(&self) -> Option<Arc<str>> {
        self.inner
            .last_report
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
