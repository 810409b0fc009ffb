//! broker 能力（BrokerClient / BrokerConsumer / BrokerProducer）
//!
//! 事件总线本身不实现 broker，只依赖以下注入能力：
//! - 客户端：创建消费者/异步生产者、列出与创建主题；
//! - 消费者：订阅单个主题并逐条阻塞等待记录，`stop` 时释放；
//! - 生产者：缓冲写入，`deliver_messages` 时强制投递。
//!
//! 创建已存在的主题应返回 `BusError::TopicAlreadyExists`，监听器会把它视为成功。
//!
use crate::error::BusResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "inmemory")]
pub mod inmemory;

#[cfg(feature = "inmemory")]
pub use inmemory::InMemoryBroker;

/// broker 中的一条已提交记录
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerRecord {
    pub topic: String,
    pub key: Option<String>,
    pub partition_key: Option<String>,
    pub value: Vec<u8>,
    pub offset: u64,
    pub timestamp: DateTime<Utc>,
}

/// 待发送的记录
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRecord {
    pub topic: String,
    pub key: Option<String>,
    pub partition_key: Option<String>,
    pub value: Vec<u8>,
}

#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// 以指定消费组创建消费者
    async fn consumer(&self, group_id: &str) -> BusResult<Box<dyn BrokerConsumer>>;

    /// 当前已存在的主题
    async fn topics(&self) -> BusResult<HashSet<String>>;

    /// 创建主题；主题已存在时返回 `TopicAlreadyExists`
    async fn create_topic(&self, topic: &str) -> BusResult<()>;

    /// 创建异步（缓冲）生产者
    async fn async_producer(&self, delivery_interval: Duration)
    -> BusResult<Arc<dyn BrokerProducer>>;
}

#[async_trait]
pub trait BrokerConsumer: Send {
    fn group_id(&self) -> &str;

    /// 订阅主题；`from_beginning` 为 true 时新消费组从最早位点开始，否则从当前末尾开始
    async fn subscribe(&mut self, topic: &str, from_beginning: bool) -> BusResult<()>;

    /// 阻塞等待下一条记录；消费者停止后返回 `None`
    async fn next_record(&mut self) -> Option<BusResult<BrokerRecord>>;

    /// 停止消费并释放消费组成员资格
    async fn stop(&mut self);
}

#[async_trait]
pub trait BrokerProducer: Send + Sync {
    /// 写入发送缓冲区，不保证已投递
    async fn produce(&self, record: OutboundRecord) -> BusResult<()>;

    /// 强制投递缓冲区内全部记录
    async fn deliver_messages(&self) -> BusResult<()>;

    /// 缓冲区中尚未投递的记录数
    async fn buffered(&self) -> usize;
}
