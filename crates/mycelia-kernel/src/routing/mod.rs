//! Point-to-point message routing.
//!
//! Re-exports the route table and handler trait so downstream consumers can
//! depend on this module directly.

pub mod table;

pub use table::{MessageHandler, MessageRouter, RouteId, RouteMatch};
