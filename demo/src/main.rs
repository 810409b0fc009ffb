use anyhow::Result;
use async_trait::async_trait;
use fleetbus::broker::InMemoryBroker;
use fleetbus::{BusConfig, InboundMessage, Listener, Processor, Publisher, handler_fn};
use fleetbus_macros::processor;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Serialize, Deserialize)]
struct InvoicePaid {
    invoice_id: String,
    amount_cents: u64,
}

static SETTLED: AtomicUsize = AtomicUsize::new(0);

// 事件类型：billing.invoice_paid
#[processor(namespace = "billing", retry, max_attempts = 3, retry_delay_ms = 200)]
struct InvoicePaidProcessor;

#[async_trait]
impl Processor for InvoicePaidProcessor {
    async fn on_event(&self) -> Result<()> {
        let event: InvoicePaid = self.message.payload_as()?;
        tracing::info!(
            invoice_id = %event.invoice_id,
            amount_cents = event.amount_cents,
            channel = %self.message.channel(),
            "invoice settled"
        );
        SETTLED.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("fleetbus=info".parse()?))
        .init();

    let mut config = BusConfig::from_env()?;
    if std::env::var("FLEETBUS_APP_NAME").is_err() {
        config.app_name = "billing".into();
    }
    config.producer_delivery_interval = Duration::from_millis(50);

    let broker = Arc::new(InMemoryBroker::new());

    // 监听器：注册处理器后启动，再打开就绪屏障
    let listener = Listener::new(broker.clone(), config.clone());
    listener.register_processor::<InvoicePaidProcessor>();
    listener.on(
        "cache.invalidated",
        handler_fn("cache-invalidator", |message: InboundMessage| async move {
            tracing::info!(payload = %message.payload(), "cache invalidated");
            anyhow::Ok(())
        }),
    );

    let handle = listener.start().await?;
    handle.ready();

    // 发布：普通事件走独占通道，缓存失效走广播通道
    let publisher = Publisher::new(broker.clone(), config).await?;
    for (i, amount) in [1200_u64, 4500, 990].into_iter().enumerate() {
        publisher
            .publish(
                "billing.invoice_paid",
                &InvoicePaid {
                    invoice_id: format!("inv-{i}"),
                    amount_cents: amount,
                },
                Some("customer-42"),
            )
            .await?;
    }
    publisher
        .broadcast("cache.invalidated", r#"{"scope": "invoices"}"#, None)
        .await?;
    publisher.flush().await?;

    while SETTLED.load(Ordering::SeqCst) < 3 {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    handle.shutdown();
    handle.join().await;
    println!(
        "settled {} invoices, active consumers: {}",
        SETTLED.load(Ordering::SeqCst),
        broker.active_consumers()
    );
    Ok(())
}
