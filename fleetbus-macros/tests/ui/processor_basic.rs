use async_trait::async_trait;
use fleetbus::Processor;
use fleetbus_macros::processor;

#[processor]
struct InvoicePaidProcessor;

#[async_trait]
impl Processor for InvoicePaidProcessor {
    async fn on_event(&self) -> anyhow::Result<()> {
        let _ = self.message.event_type();
        Ok(())
    }
}

fn main() {}
