//! 入站消息（InboundMessage）
//!
//! broker 记录经信封解码后的只读视图，生命周期为一次分发。
//!
use crate::broker::BrokerRecord;
use crate::envelope;
use crate::error::{BusError, BusResult};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;

/// 投递通道
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    /// 同一服务的所有实例共享消费组，每条消息只由一个实例处理
    Exclusive,
    /// 每个实例独立消费组，每条消息投递给所有实例
    Broadcast,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Exclusive => "exclusive",
            Channel::Broadcast => "broadcast",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    topic: String,
    key: Option<String>,
    offset: u64,
    channel: Channel,
    service: String,
    event_type: String,
    payload: Value,
    received_at: DateTime<Utc>,
}

impl InboundMessage {
    pub fn from_record(record: &BrokerRecord, channel: Channel) -> BusResult<Self> {
        let (service, event_type, payload) = envelope::decode(&record.value)?.into_parts();

        Ok(Self {
            topic: record.topic.clone(),
            key: record.key.clone(),
            offset: record.offset,
            channel,
            service,
            event_type,
            payload,
            received_at: Utc::now(),
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// 将负载反序列化为具体类型
    pub fn payload_as<T: DeserializeOwned>(&self) -> BusResult<T> {
        serde_json::from_value(self.payload.clone()).map_err(|e| {
            BusError::decoding(format!(
                "payload of `{}` does not match the expected type: {e}",
                self.event_type
            ))
        })
    }
}

impl fmt::Display for InboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "InboundMessage(topic={}, key={:?}, offset={}, event_type={}, payload={})",
            self.topic, self.key, self.offset, self.event_type, self.payload
        )
    }
}
