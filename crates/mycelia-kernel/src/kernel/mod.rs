//! Kernel runtime: subscription registry, QoS fan-out, and the handler
//! context shared across routes.

mod runtime;
mod subscriptions;
mod types;

pub use runtime::{Kernel, KernelCtx};
pub use subscriptions::{SubscriptionId, SubscriptionRegistry};
pub use types::{PublishReport, QoS};
