//! Benchmark harness.
//!
//! Measures the kernel in the report's five categories (queue operations,
//! routing, end-to-end, memory, latency percentiles) and assembles a
//! `BenchReport`.

pub mod probe;
pub mod stats;
pub mod suite;

pub use probe::{MemoryProbe, SysinfoProbe};
pub use suite::BenchSuite;

pub const SECTION_QUEUE: &str = "Queue Operations";
pub const SECTION_ROUTING: &str = "Message Routing";
pub const SECTION_E2E: &str = "End-to-End";
pub const SECTION_MEMORY: &str = "Memory";
pub const SECTION_LATENCY: &str = "Latency Percentiles";
