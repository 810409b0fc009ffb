//! 事件总线配置（BusConfig）
//!
//! 监听器与发布器各自持有一份配置副本：`configure` 只修改自身副本，
//! 不会影响调用方传入的共享配置。主题名默认由 `app_name` 推导：
//! - 独占主题：`{app_name}.events.exclusive`
//! - 广播主题：`{app_name}.events.broadcast`
//!
use crate::error::{BusError, BusResult};
use bon::Builder;
use std::time::Duration;
use uuid::Uuid;

pub const DEFAULT_APP_NAME: &str = "MyApp";

const ENV_PREFIX: &str = "FLEETBUS_";

#[derive(Clone, Debug, Builder)]
pub struct BusConfig {
    /// 服务名：同时作为独占通道的消费组 ID 与信封中的 `service`
    #[builder(into, default = DEFAULT_APP_NAME.to_string())]
    pub app_name: String,
    /// 覆盖独占主题名（缺省按 `app_name` 推导）
    #[builder(into)]
    pub exclusive_topic: Option<String>,
    /// 覆盖广播主题名（缺省按 `app_name` 推导）
    #[builder(into)]
    pub broadcast_topic: Option<String>,
    /// 发布目标主题（缺省为独占主题）
    #[builder(into)]
    pub publish_topic: Option<String>,
    /// 进程实例标识，用于生成广播消费组 ID（缺省为随机 UUID）
    #[builder(into)]
    pub instance_id: Option<String>,
    /// 异步生产者的后台投递间隔；为零时仅在 `flush` 时投递
    #[builder(default = Duration::from_secs(1))]
    pub producer_delivery_interval: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl BusConfig {
    pub fn exclusive_topic_name(&self) -> String {
        self.exclusive_topic
            .clone()
            .unwrap_or_else(|| format!("{}.events.exclusive", self.app_name))
    }

    pub fn broadcast_topic_name(&self) -> String {
        self.broadcast_topic
            .clone()
            .unwrap_or_else(|| format!("{}.events.broadcast", self.app_name))
    }

    pub fn publish_topic_name(&self) -> String {
        self.publish_topic
            .clone()
            .unwrap_or_else(|| self.exclusive_topic_name())
    }

    /// 独占通道消费组：同一服务的所有实例共享，消息只会被其中一个实例消费
    pub fn exclusive_group_id(&self) -> String {
        self.app_name.clone()
    }

    /// 广播通道消费组：每个进程唯一，所有实例都会收到每条消息。
    /// 未设置 `instance_id` 时每次调用都会生成新的 ID，应只在启动时调用一次。
    pub fn broadcast_group_id(&self) -> String {
        let instance = self
            .instance_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        format!("{}.{}", self.app_name, instance)
    }

    /// 校验启动所需字段，返回第一个缺失的字段
    pub fn validate(&self) -> BusResult<()> {
        if self.app_name.trim().is_empty() {
            return Err(BusError::configuration("app_name", "app name is not set"));
        }
        if self.exclusive_topic_name().trim().is_empty() {
            return Err(BusError::configuration(
                "exclusive_topic",
                "exclusive events topic is not set",
            ));
        }
        if self.broadcast_topic_name().trim().is_empty() {
            return Err(BusError::configuration(
                "broadcast_topic",
                "broadcast events topic is not set",
            ));
        }
        Ok(())
    }

    /// 从 `FLEETBUS_*` 环境变量读取配置，未设置的键使用默认值
    pub fn from_env() -> BusResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> BusResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        let producer_delivery_interval = match get("PRODUCER_DELIVERY_INTERVAL_MS") {
            Some(raw) => {
                let ms: u64 = raw.trim().parse().map_err(|e: std::num::ParseIntError| {
                    BusError::configuration("producer_delivery_interval", e.to_string())
                })?;
                Duration::from_millis(ms)
            }
            None => Duration::from_secs(1),
        };

        Ok(Self::builder()
            .app_name(get("APP_NAME").unwrap_or_else(|| DEFAULT_APP_NAME.to_string()))
            .maybe_exclusive_topic(get("EXCLUSIVE_TOPIC"))
            .maybe_broadcast_topic(get("BROADCAST_TOPIC"))
            .maybe_publish_topic(get("PUBLISH_TOPIC"))
            .maybe_instance_id(get("INSTANCE_ID"))
            .producer_delivery_interval(producer_delivery_interval)
            .build())
    }
}
