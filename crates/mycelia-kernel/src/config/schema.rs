use serde::Deserialize;
use mycelia_core::error::{MyceliaError, Result};
use mycelia_core::report::StatusBlock;

use crate::queue::OverflowPolicy;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MyceliaConfig {
    pub version: u32,

    #[serde(default)]
    pub kernel: KernelSection,

    #[serde(default)]
    pub ops: OpsSection,

    #[serde(default)]
    pub bench: BenchSection,

    #[serde(default)]
    pub report: ReportConfig,
}

impl Default for MyceliaConfig {
    fn default() -> Self {
        Self {
            version: 1,
            kernel: KernelSection::default(),
            ops: OpsSection::default(),
            bench: BenchSection::default(),
            report: ReportConfig::default(),
        }
    }
}

impl MyceliaConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(MyceliaError::UnsupportedVersion);
        }
        self.kernel.validate()?;
        self.bench.validate()?;
        self.report.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KernelSection {
    #[serde(default = "default_inbox_capacity")]
    pub inbox_capacity: usize,

    #[serde(default)]
    pub overflow: OverflowPolicy,

    #[serde(default = "default_reliable_timeout_ms")]
    pub reliable_timeout_ms: u64,
}

impl Default for KernelSection {
    fn default() -> Self {
        Self {
            inbox_capacity: default_inbox_capacity(),
            overflow: OverflowPolicy::default(),
            reliable_timeout_ms: default_reliable_timeout_ms(),
        }
    }
}

impl KernelSection {
    pub fn validate(&self) -> Result<()> {
        if !(1..=1_048_576).contains(&self.inbox_capacity) {
            return Err(MyceliaError::BadRequest(
                "kernel.inbox_capacity must be between 1 and 1048576".into(),
            ));
        }
        if self.reliable_timeout_ms > 60_000 {
            return Err(MyceliaError::BadRequest(
                "kernel.reliable_timeout_ms must be at most 60000".into(),
            ));
        }
        Ok(())
    }
}

fn default_inbox_capacity() -> usize {
    1024
}
fn default_reliable_timeout_ms() -> u64 {
    1500
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpsSection {
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for OpsSection {
    fn default() -> Self {
        Self { listen: default_listen() }
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".into()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BenchSection {
    #[serde(default = "default_iterations")]
    pub iterations: usize,

    #[serde(default = "default_subscribers")]
    pub subscribers: usize,

    #[serde(default = "default_routes")]
    pub routes: usize,

    #[serde(default = "default_payload_bytes")]
    pub payload_bytes: usize,

    #[serde(default = "default_latency_samples")]
    pub latency_samples: usize,
}

impl Default for BenchSection {
    fn default() -> Self {
        Self {
            iterations: default_iterations(),
            subscribers: default_subscribers(),
            routes: default_routes(),
            payload_bytes: default_payload_bytes(),
            latency_samples: default_latency_samples(),
        }
    }
}

impl BenchSection {
    pub fn validate(&self) -> Result<()> {
        if !(100..=10_000_000).contains(&self.iterations) {
            return Err(MyceliaError::BadRequest(
                "bench.iterations must be between 100 and 10000000".into(),
            ));
        }
        if !(1..=1024).contains(&self.subscribers) {
            return Err(MyceliaError::BadRequest(
                "bench.subscribers must be between 1 and 1024".into(),
            ));
        }
        if !(1..=10_000).contains(&self.routes) {
            return Err(MyceliaError::BadRequest(
                "bench.routes must be between 1 and 10000".into(),
            ));
        }
        if self.payload_bytes > 65_536 {
            return Err(MyceliaError::BadRequest(
                "bench.payload_bytes must be at most 65536".into(),
            ));
        }
        if self.latency_samples < 100 || self.latency_samples > self.iterations {
            return Err(MyceliaError::BadRequest(
                "bench.latency_samples must be at least 100 and at most bench.iterations".into(),
            ));
        }
        Ok(())
    }
}

fn default_iterations() -> usize {
    100_000
}
fn default_subscribers() -> usize {
    4
}
fn default_routes() -> usize {
    64
}
fn default_payload_bytes() -> usize {
    64
}
fn default_latency_samples() -> usize {
    10_000
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportConfig {
    #[serde(default = "default_title")]
    pub title: String,

    #[serde(default)]
    pub status: StatusConfig,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            status: StatusConfig::default(),
        }
    }
}

impl ReportConfig {
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(MyceliaError::BadRequest("report.title must not be empty".into()));
        }
        self.status.validate()
    }
}

fn default_title() -> String {
    "Mycelia Kernel Benchmark Results".into()
}

/// Fixed closing fields of the report.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatusConfig {
    #[serde(default = "default_document_status")]
    pub document_status: String,
    #[serde(default = "default_priority")]
    pub priority: String,
    #[serde(default = "default_estimated_effort")]
    pub estimated_effort: String,
    #[serde(default = "default_expected_roi")]
    pub expected_roi: String,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            document_status: default_document_status(),
            priority: default_priority(),
            estimated_effort: default_estimated_effort(),
            expected_roi: default_expected_roi(),
        }
    }
}

impl StatusConfig {
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("document_status", &self.document_status),
            ("priority", &self.priority),
            ("estimated_effort", &self.estimated_effort),
            ("expected_roi", &self.expected_roi),
        ];
        for (name, v) in fields {
            if v.trim().is_empty() || v.contains('\n') {
                return Err(MyceliaError::BadRequest(format!(
                    "report.status.{name} must be a non-empty single line"
                )));
            }
        }
        Ok(())
    }

    pub fn to_block(&self) -> StatusBlock {
        StatusBlock {
            document_status: self.document_status.clone(),
            priority: self.priority.clone(),
            estimated_effort: self.estimated_effort.clone(),
            expected_roi: self.expected_roi.clone(),
        }
    }
}

fn default_document_status() -> String {
    "Planning Complete".into()
}
fn default_priority() -> String {
    "Medium".into()
}
fn default_estimated_effort() -> String {
    "Unestimated".into()
}
fn default_expected_roi() -> String {
    "Unknown".into()
}
