//! Echo service: `echo/{topic}` is re-published to `echoed/{topic}`.

use async_trait::async_trait;

use mycelia_core::error::{MyceliaError, Result};
use mycelia_core::message::Message;

use crate::kernel::{KernelCtx, QoS};
use crate::routing::MessageHandler;

/// Route pattern the echo service is mounted on.
pub const ECHO_PATTERN: &str = "echo/{topic}";

/// Re-publishes `echo/{topic}` messages to `echoed/{topic}` subscribers
/// (Lossy). Useful to prove the send -> publish path end to end.
#[derive(Default)]
pub struct EchoService;

impl EchoService {
    pub fn new() -> Self {
        Self
    }

    pub fn pattern(&self) -> &'static str {
        ECHO_PATTERN
    }
}

#[async_trait]
impl MessageHandler for EchoService {
    async fn handle(&self, ctx: KernelCtx, msg: Message) -> Result<()> {
        let topic = ctx
            .param("topic")
            .ok_or_else(|| MyceliaError::Internal("echo route without topic".into()))?;

        let out = ctx
            .kernel()
            .message(&format!("echoed/{topic}"), msg.payload)?
            .with_scopes(msg.scopes);
        let report = ctx.publish(out, QoS::Lossy).await?;
        tracing::debug!(route = %ctx.route(), %topic, delivered = report.delivered, "echoed");
        Ok(())
    }
}
