//! Mycelia kernel library entry.
//!
//! This crate wires queues, the route table, subscriptions, the kernel
//! runtime, the bench harness, and the HTTP surface into one stack. It is
//! consumed by the binary (`main.rs`) and by integration tests.

pub mod app_state;
pub mod bench;
pub mod config;
pub mod kernel;
pub mod obs;
pub mod ops;
pub mod queue;
pub mod router;
pub mod routing;
pub mod services;
