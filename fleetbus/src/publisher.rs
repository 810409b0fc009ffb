//! 发布器（Publisher）
//!
//! 将负载包装为信封后交给 broker 的异步发送路径，按事件类型作为记录键。
//! 发送是缓冲的：在 `flush` 之前不保证已投递。
//!
use crate::broker::{BrokerClient, BrokerProducer, OutboundRecord};
use crate::config::BusConfig;
use crate::envelope::Envelope;
use crate::error::{BusError, BusResult};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

pub struct Publisher {
    config: BusConfig,
    producer: Arc<dyn BrokerProducer>,
}

impl Publisher {
    /// 以 `producer_delivery_interval` 创建异步生产者
    pub async fn new(client: Arc<dyn BrokerClient>, config: BusConfig) -> BusResult<Self> {
        let producer = client
            .async_producer(config.producer_delivery_interval)
            .await?;

        Ok(Self { config, producer })
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// 修改本发布器的配置副本，调用方持有的配置不受影响。
    /// 生产者已创建，修改 `producer_delivery_interval` 不会生效。
    pub fn configure<F>(&mut self, f: F)
    where
        F: FnOnce(&mut BusConfig),
    {
        f(&mut self.config);
    }

    /// 发布事件到发布主题（缺省为独占主题）
    pub async fn publish<P>(
        &self,
        event_type: &str,
        payload: &P,
        partition_key: Option<&str>,
    ) -> BusResult<()>
    where
        P: Serialize + ?Sized,
    {
        let topic = self.config.publish_topic_name();
        self.send(topic, event_type, payload, partition_key).await
    }

    /// 发布事件到广播主题
    pub async fn broadcast<P>(
        &self,
        event_type: &str,
        payload: &P,
        partition_key: Option<&str>,
    ) -> BusResult<()>
    where
        P: Serialize + ?Sized,
    {
        let topic = self.config.broadcast_topic_name();
        self.send(topic, event_type, payload, partition_key).await
    }

    /// 强制投递缓冲区内的全部消息
    pub async fn flush(&self) -> BusResult<()> {
        self.producer.deliver_messages().await
    }

    async fn send<P>(
        &self,
        topic: String,
        event_type: &str,
        payload: &P,
        partition_key: Option<&str>,
    ) -> BusResult<()>
    where
        P: Serialize + ?Sized,
    {
        if event_type.trim().is_empty() {
            return Err(BusError::argument("event_type is required"));
        }

        let payload = serde_json::to_value(payload).map_err(|e| BusError::Encoding {
            reason: e.to_string(),
        })?;
        let envelope = Envelope::new(
            self.config.app_name.as_str(),
            event_type,
            embed_json_string(payload),
        )?;

        self.producer
            .produce(OutboundRecord {
                topic: topic.clone(),
                key: Some(event_type.to_string()),
                partition_key: partition_key.map(str::to_string),
                value: envelope.to_bytes()?,
            })
            .await?;

        tracing::debug!(topic = %topic, event_type, "message buffered");
        Ok(())
    }
}

// 看起来像 JSON 的字符串负载按 JSON 嵌入，避免二次编码；解析失败则原样保留
fn embed_json_string(payload: Value) -> Value {
    let Value::String(raw) = payload else {
        return payload;
    };

    let looks_like_json = matches!(raw.trim_start().chars().next(), Some('{' | '['));
    if !looks_like_json {
        return Value::String(raw);
    }

    serde_json::from_str(&raw).unwrap_or(Value::String(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::InMemoryBroker;
    use crate::envelope;
    use serde_json::json;
    use std::time::Duration;

    fn config() -> BusConfig {
        BusConfig::builder()
            .app_name("billing")
            .producer_delivery_interval(Duration::ZERO)
            .build()
    }

    #[tokio::test]
    async fn missing_event_type_never_reaches_the_broker() {
        let broker = InMemoryBroker::new();
        let publisher = Publisher::new(Arc::new(broker.clone()), config())
            .await
            .unwrap();

        let err = publisher
            .publish("", &json!({"id": 1}), None)
            .await
            .unwrap_err();
        assert!(matches!(err, BusError::Argument { .. }));

        publisher.flush().await.unwrap();
        assert!(broker.records("billing.events.exclusive").await.is_empty());
    }

    #[tokio::test]
    async fn publish_buffers_until_flush() {
        let broker = InMemoryBroker::new();
        let publisher = Publisher::new(Arc::new(broker.clone()), config())
            .await
            .unwrap();

        publisher
            .publish("invoice.paid", &json!({"id": 1}), Some("customer-9"))
            .await
            .unwrap();
        assert!(broker.records("billing.events.exclusive").await.is_empty());

        publisher.flush().await.unwrap();
        let records = broker.records("billing.events.exclusive").await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key.as_deref(), Some("invoice.paid"));
        assert_eq!(records[0].partition_key.as_deref(), Some("customer-9"));

        let envelope = envelope::decode(&records[0].value).unwrap();
        assert_eq!(envelope.service(), "billing");
        assert_eq!(envelope.event_type(), "invoice.paid");
        assert_eq!(envelope.payload(), &json!({"id": 1}));
    }

    #[tokio::test]
    async fn broadcast_targets_the_broadcast_topic() {
        let broker = InMemoryBroker::new();
        let publisher = Publisher::new(Arc::new(broker.clone()), config())
            .await
            .unwrap();

        publisher
            .broadcast("cache.invalidated", &json!(["users"]), None)
            .await
            .unwrap();
        publisher.flush().await.unwrap();

        assert_eq!(broker.records("billing.events.broadcast").await.len(), 1);
        assert!(broker.records("billing.events.exclusive").await.is_empty());
    }

    #[test]
    fn json_looking_strings_are_embedded() {
        assert_eq!(
            embed_json_string(json!(r#"{"id": 5}"#)),
            json!({"id": 5})
        );
        assert_eq!(embed_json_string(json!("  [1, 2]")), json!([1, 2]));
        assert_eq!(embed_json_string(json!("hello")), json!("hello"));
        assert_eq!(embed_json_string(json!("{not json")), json!("{not json"));
        assert_eq!(embed_json_string(json!("42")), json!("42"));
        assert_eq!(embed_json_string(json!(42)), json!(42));
    }

    #[tokio::test]
    async fn configure_does_not_touch_the_shared_config() {
        let broker = InMemoryBroker::new();
        let shared = config();
        let mut publisher = Publisher::new(Arc::new(broker.clone()), shared.clone())
            .await
            .unwrap();
        publisher.configure(|cfg| cfg.publish_topic = Some("orders.events.exclusive".into()));

        publisher
            .publish("order.requested", &json!({}), None)
            .await
            .unwrap();
        publisher.flush().await.unwrap();

        assert_eq!(shared.publish_topic, None);
        assert_eq!(broker.records("orders.events.exclusive").await.len(), 1);
    }
}
