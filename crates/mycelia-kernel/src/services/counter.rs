//! Counting sink handler.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use mycelia_core::error::Result;
use mycelia_core::message::Message;

use crate::kernel::KernelCtx;
use crate::routing::MessageHandler;

/// Counts handled messages and payload bytes. Used as the sink for send
/// benchmarks and in tests.
#[derive(Default)]
pub struct CountingHandler {
    messages: AtomicU64,
    bytes: AtomicU64,
}

impl CountingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> u64 {
        self.messages.load(Ordering::Relaxed)
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl MessageHandler for CountingHandler {
    async fn handle(&self, _ctx: KernelCtx, msg: Message) -> Result<()> {
        self.messages.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(msg.payload.len() as u64, Ordering::Relaxed);
        Ok(())
    }
}
