//! 内存版 broker（InMemoryBroker）
//!
//! 以追加日志模拟主题，按（主题, 消费组）维护消费位点：
//! - 同一消费组内的多个消费者竞争同一位点，每条记录只会交给其中一个；
//! - 不同消费组各自独立，都会收到全部记录；
//! - 新消费组从最早位点（`from_beginning`）或当前末尾开始；
//! - 生产者先缓冲，`deliver_messages` 或后台周期任务才真正追加到主题。
//!
//! 典型用途：测试环境、示例与本地开发。不做持久化，进程退出即丢失。

use super::{BrokerClient, BrokerConsumer, BrokerProducer, BrokerRecord, OutboundRecord};
use crate::error::{BusError, BusResult as Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

#[derive(Clone, Default)]
pub struct InMemoryBroker {
    shared: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    state: Mutex<BrokerState>,
    // 有新记录追加时唤醒所有等待中的消费者
    appended: Notify,
    active_consumers: AtomicUsize,
}

#[derive(Default)]
struct BrokerState {
    topics: HashMap<String, TopicLog>,
}

#[derive(Default)]
struct TopicLog {
    records: Vec<BrokerRecord>,
    // 消费组 -> 下一条待消费的位点
    cursors: HashMap<String, usize>,
}

impl BrokerState {
    fn claim(&mut self, topic: &str, group_id: &str) -> Option<BrokerRecord> {
        let log = self.topics.get_mut(topic)?;
        let cursor = log.cursors.get_mut(group_id)?;
        let record = log.records.get(*cursor)?.clone();
        *cursor += 1;
        Some(record)
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 未停止的消费者数量
    pub fn active_consumers(&self) -> usize {
        self.shared.active_consumers.load(Ordering::SeqCst)
    }

    /// 主题中已提交的全部记录
    pub async fn records(&self, topic: &str) -> Vec<BrokerRecord> {
        let state = self.shared.state.lock().await;
        state
            .topics
            .get(topic)
            .map(|log| log.records.clone())
            .unwrap_or_default()
    }

    async fn append(&self, batch: Vec<OutboundRecord>) {
        if batch.is_empty() {
            return;
        }

        {
            let mut state = self.shared.state.lock().await;
            for out in batch {
                let log = state.topics.entry(out.topic.clone()).or_default();
                let offset = log.records.len() as u64;
                log.records.push(BrokerRecord {
                    topic: out.topic,
                    key: out.key,
                    partition_key: out.partition_key,
                    value: out.value,
                    offset,
                    timestamp: Utc::now(),
                });
            }
        }

        self.shared.appended.notify_waiters();
    }
}

#[async_trait]
impl BrokerClient for InMemoryBroker {
    async fn consumer(&self, group_id: &str) -> Result<Box<dyn BrokerConsumer>> {
        if group_id.trim().is_empty() {
            return Err(BusError::broker("group id must not be empty"));
        }

        self.shared.active_consumers.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(InMemoryConsumer {
            shared: self.shared.clone(),
            group_id: group_id.to_string(),
            topic: None,
            stopped: false,
        }))
    }

    async fn topics(&self) -> Result<HashSet<String>> {
        let state = self.shared.state.lock().await;
        Ok(state.topics.keys().cloned().collect())
    }

    async fn create_topic(&self, topic: &str) -> Result<()> {
        let mut state = self.shared.state.lock().await;
        if state.topics.contains_key(topic) {
            return Err(BusError::TopicAlreadyExists {
                topic: topic.to_string(),
            });
        }

        state.topics.insert(topic.to_string(), TopicLog::default());
        tracing::debug!(topic, "topic created");
        Ok(())
    }

    async fn async_producer(&self, delivery_interval: Duration) -> Result<Arc<dyn BrokerProducer>> {
        let producer = InMemoryProducer {
            broker: self.clone(),
            buffer: Arc::new(Mutex::new(Vec::new())),
            token: CancellationToken::new(),
        };

        if !delivery_interval.is_zero() {
            producer.spawn_periodic_delivery(delivery_interval);
        }

        Ok(Arc::new(producer))
    }
}

pub struct InMemoryConsumer {
    shared: Arc<Shared>,
    group_id: String,
    topic: Option<String>,
    stopped: bool,
}

impl InMemoryConsumer {
    fn release(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.shared.active_consumers.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl BrokerConsumer for InMemoryConsumer {
    fn group_id(&self) -> &str {
        &self.group_id
    }

    async fn subscribe(&mut self, topic: &str, from_beginning: bool) -> Result<()> {
        if let Some(current) = &self.topic {
            if current != topic {
                return Err(BusError::broker(format!(
                    "consumer `{}` is already subscribed to `{current}`",
                    self.group_id
                )));
            }
            return Ok(());
        }

        let mut state = self.shared.state.lock().await;
        let log = state.topics.entry(topic.to_string()).or_default();
        let start = if from_beginning { 0 } else { log.records.len() };
        log.cursors.entry(self.group_id.clone()).or_insert(start);
        self.topic = Some(topic.to_string());
        Ok(())
    }

    async fn next_record(&mut self) -> Option<Result<BrokerRecord>> {
        if self.stopped {
            return None;
        }

        let Some(topic) = self.topic.clone() else {
            return Some(Err(BusError::broker(format!(
                "consumer `{}` is not subscribed",
                self.group_id
            ))));
        };

        let shared = self.shared.clone();
        loop {
            // 先登记唤醒再检查位点，避免错过检查与等待之间追加的记录
            let appended = shared.appended.notified();
            {
                let mut state = shared.state.lock().await;
                if let Some(record) = state.claim(&topic, &self.group_id) {
                    return Some(Ok(record));
                }
            }
            appended.await;
        }
    }

    async fn stop(&mut self) {
        self.release();
    }
}

impl Drop for InMemoryConsumer {
    fn drop(&mut self) {
        self.release();
    }
}

pub struct InMemoryProducer {
    broker: InMemoryBroker,
    buffer: Arc<Mutex<Vec<OutboundRecord>>>,
    token: CancellationToken,
}

impl InMemoryProducer {
    fn spawn_periodic_delivery(&self, interval: Duration) {
        let broker = self.broker.clone();
        let buffer = self.buffer.clone();
        let token = self.token.clone();

        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let batch = std::mem::take(&mut *buffer.lock().await);
                        broker.append(batch).await;
                    }
                }
            }
        });
    }
}

#[async_trait]
impl BrokerProducer for InMemoryProducer {
    async fn produce(&self, record: OutboundRecord) -> Result<()> {
        if record.topic.trim().is_empty() {
            return Err(BusError::broker("topic must not be empty"));
        }

        self.buffer.lock().await.push(record);
        Ok(())
    }

    async fn deliver_messages(&self) -> Result<()> {
        let batch = std::mem::take(&mut *self.buffer.lock().await);
        self.broker.append(batch).await;
        Ok(())
    }

    async fn buffered(&self) -> usize {
        self.buffer.lock().await.len()
    }
}

impl Drop for InMemoryProducer {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outbound(topic: &str, value: &str) -> OutboundRecord {
        OutboundRecord {
            topic: topic.into(),
            key: Some("k".into()),
            partition_key: None,
            value: value.as_bytes().to_vec(),
        }
    }

    async fn next_value(consumer: &mut Box<dyn BrokerConsumer>) -> String {
        let record = tokio::time::timeout(Duration::from_secs(1), consumer.next_record())
            .await
            .expect("record within timeout")
            .expect("consumer running")
            .expect("record ok");
        String::from_utf8(record.value).unwrap()
    }

    #[tokio::test]
    async fn create_topic_twice_reports_already_exists() {
        let broker = InMemoryBroker::new();
        broker.create_topic("t").await.unwrap();

        let err = broker.create_topic("t").await.unwrap_err();
        assert!(matches!(err, BusError::TopicAlreadyExists { .. }));
        assert!(broker.topics().await.unwrap().contains("t"));
    }

    #[tokio::test]
    async fn producer_buffers_until_delivered() {
        let broker = InMemoryBroker::new();
        let producer = broker.async_producer(Duration::ZERO).await.unwrap();

        producer.produce(outbound("t", "a")).await.unwrap();
        assert_eq!(producer.buffered().await, 1);
        assert!(broker.records("t").await.is_empty());

        producer.deliver_messages().await.unwrap();
        assert_eq!(producer.buffered().await, 0);
        let records = broker.records("t").await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].offset, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_delivery_flushes_in_background() {
        let broker = InMemoryBroker::new();
        let producer = broker
            .async_producer(Duration::from_millis(100))
            .await
            .unwrap();

        producer.produce(outbound("t", "a")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;

        assert_eq!(broker.records("t").await.len(), 1);
    }

    #[tokio::test]
    async fn same_group_competes_and_groups_are_independent() {
        let broker = InMemoryBroker::new();
        let mut a = broker.consumer("svc").await.unwrap();
        let mut b = broker.consumer("svc").await.unwrap();
        let mut other = broker.consumer("svc.other").await.unwrap();
        a.subscribe("t", true).await.unwrap();
        b.subscribe("t", true).await.unwrap();
        other.subscribe("t", true).await.unwrap();

        let producer = broker.async_producer(Duration::ZERO).await.unwrap();
        producer.produce(outbound("t", "1")).await.unwrap();
        producer.produce(outbound("t", "2")).await.unwrap();
        producer.deliver_messages().await.unwrap();

        let first = next_value(&mut a).await;
        let second = next_value(&mut b).await;
        assert_eq!((first.as_str(), second.as_str()), ("1", "2"));

        assert_eq!(next_value(&mut other).await, "1");
        assert_eq!(next_value(&mut other).await, "2");
    }

    #[tokio::test]
    async fn latest_offset_skips_history() {
        let broker = InMemoryBroker::new();
        let producer = broker.async_producer(Duration::ZERO).await.unwrap();
        producer.produce(outbound("t", "old")).await.unwrap();
        producer.deliver_messages().await.unwrap();

        let mut earliest = broker.consumer("g1").await.unwrap();
        let mut latest = broker.consumer("g2").await.unwrap();
        earliest.subscribe("t", true).await.unwrap();
        latest.subscribe("t", false).await.unwrap();

        producer.produce(outbound("t", "new")).await.unwrap();
        producer.deliver_messages().await.unwrap();

        assert_eq!(next_value(&mut earliest).await, "old");
        assert_eq!(next_value(&mut latest).await, "new");
    }

    #[tokio::test]
    async fn waiting_consumer_wakes_on_append() {
        let broker = InMemoryBroker::new();
        let mut consumer = broker.consumer("g").await.unwrap();
        consumer.subscribe("t", false).await.unwrap();

        let producer = broker.async_producer(Duration::ZERO).await.unwrap();
        let waiter = tokio::spawn(async move { next_value(&mut consumer).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        producer.produce(outbound("t", "late")).await.unwrap();
        producer.deliver_messages().await.unwrap();

        assert_eq!(waiter.await.unwrap(), "late");
    }

    #[tokio::test]
    async fn stop_and_drop_release_consumers() {
        let broker = InMemoryBroker::new();
        let mut a = broker.consumer("g").await.unwrap();
        let b = broker.consumer("g").await.unwrap();
        assert_eq!(broker.active_consumers(), 2);

        a.subscribe("t", true).await.unwrap();
        a.stop().await;
        assert!(a.next_record().await.is_none());
        assert_eq!(broker.active_consumers(), 1);

        drop(b);
        drop(a);
        assert_eq!(broker.active_consumers(), 0);
    }

    #[tokio::test]
    async fn consumer_keeps_a_single_subscription() {
        let broker = InMemoryBroker::new();
        let mut consumer = broker.consumer("g").await.unwrap();
        consumer.subscribe("t1", true).await.unwrap();
        consumer.subscribe("t1", true).await.unwrap();

        let err = consumer.subscribe("t2", true).await.unwrap_err();
        assert!(matches!(err, BusError::Broker { .. }));
    }
}
