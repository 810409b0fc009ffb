use async_trait::async_trait;
use fleetbus::{InboundMessage, Processor};
use fleetbus_macros::processor;

#[processor(namespace = "billing", retry, max_attempts = 5, retry_delay_ms = 250)]
struct RefundIssuedProcessor {
    message: InboundMessage,
    attempts: std::sync::atomic::AtomicU32,
}

#[processor(event_type = "cache.invalidated", retry = false)]
struct CacheProcessor {
    scopes: Vec<String>,
}

#[async_trait]
impl Processor for RefundIssuedProcessor {
    async fn on_event(&self) -> anyhow::Result<()> {
        self.attempts
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl Processor for CacheProcessor {
    async fn on_event(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.scopes.is_empty(), "scopes are filled per message");
        Ok(())
    }
}

fn main() {}
