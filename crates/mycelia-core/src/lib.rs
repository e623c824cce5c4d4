//! Mycelia core: transport-agnostic message primitives, error types, and the
//! benchmark report format.
//!
//! This crate defines the addressing rules (paths, route patterns, scopes),
//! the message model, and the report text contract shared by the kernel
//! runtime and tooling. It carries no async runtime so it can be reused by
//! report consumers that never start a kernel.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here. All fallible paths
//! surface as `MyceliaError`/`Result` so malformed paths, envelopes, or report
//! files never crash a process.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod message;
pub mod path;
pub mod report;
pub mod scope;

/// Shared result type.
pub use error::{ErrorCode, MyceliaError, Result};
