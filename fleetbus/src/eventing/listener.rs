//! 监听器（Listener）
//!
//! 双通道消费与分发：
//! - 独占通道：同一服务所有实例共享消费组（`app_name`），从最早位点开始，每条消息只由一个实例处理；
//! - 广播通道：每个进程唯一的消费组，从订阅时的末尾开始，每个实例都会收到每条消息；
//! - 每个通道一个长驻任务，逐条解码并按注册顺序调用处理器；
//! - 解码失败、处理器错误或 panic 都在发生处记录，不会终止循环或影响另一通道。
//!
//! 生命周期：`Uninitialized → Configured → Running`。`start` 消费监听器本身，
//! 因此不能重复启动；返回的 `ListenerHandle` 在关闭或被丢弃时停止两条循环并释放消费者。
//!
//! 就绪屏障：订阅在 `start` 中完成，但循环要等到 `ListenerHandle::ready` 才开始消费。
//! 调用方约定：在调用 `ready` 之前注册好全部处理器。
//!
use super::handler::panic_message;
use super::processor::{Processor, ProcessorHandler, RetryDelay, TokioDelay};
use super::{CallbackRegistry, EventHandler};
use crate::broker::{BrokerClient, BrokerConsumer, BrokerRecord};
use crate::config::BusConfig;
use crate::error::{BusError, BusResult};
use crate::message::{Channel, InboundMessage};
use bon::Builder;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

// broker 返回错误后再次拉取前的等待
const BROKER_ERROR_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListenerState {
    /// 缺少 broker 客户端或必要配置
    Uninitialized,
    /// 可以启动
    Configured,
    /// 已启动，由 `ListenerHandle` 表示
    Running,
}

#[derive(Builder)]
pub struct Listener {
    client: Option<Arc<dyn BrokerClient>>,
    #[builder(default)]
    config: BusConfig,
    #[builder(default)]
    registry: CallbackRegistry,
    #[builder(default = default_retry_delay())]
    retry_delay: Arc<dyn RetryDelay>,
}

fn default_retry_delay() -> Arc<dyn RetryDelay> {
    Arc::new(TokioDelay)
}

impl Listener {
    pub fn new(client: Arc<dyn BrokerClient>, config: BusConfig) -> Self {
        Self::builder().client(client).config(config).build()
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// 修改本监听器的配置副本，调用方持有的配置不受影响
    pub fn configure<F>(&mut self, f: F)
    where
        F: FnOnce(&mut BusConfig),
    {
        f(&mut self.config);
    }

    /// 共享注册表的克隆
    pub fn registry(&self) -> CallbackRegistry {
        self.registry.clone()
    }

    pub fn on(&self, event_type: impl Into<String>, handler: Arc<dyn EventHandler>) {
        self.registry.register(event_type, handler);
    }

    pub fn unbind(&self, event_type: &str, handler: &Arc<dyn EventHandler>) -> bool {
        self.registry.unregister(event_type, handler)
    }

    /// 以 `P::event_type()` 注册处理器，返回的句柄可用于 `unbind`
    pub fn register_processor<P: Processor>(&self) -> Arc<dyn EventHandler> {
        self.register_processor_as::<P>(P::event_type())
    }

    /// 以指定事件类型注册处理器
    pub fn register_processor_as<P: Processor>(
        &self,
        event_type: impl Into<String>,
    ) -> Arc<dyn EventHandler> {
        let event_type = event_type.into();
        tracing::debug!(
            processor = std::any::type_name::<P>(),
            event_type = %event_type,
            "registering processor"
        );

        let handler: Arc<dyn EventHandler> =
            Arc::new(ProcessorHandler::<P>::new(self.retry_delay.clone()));
        self.registry.register(event_type, handler.clone());
        handler
    }

    pub fn state(&self) -> ListenerState {
        if self.validate().is_ok() {
            ListenerState::Configured
        } else {
            ListenerState::Uninitialized
        }
    }

    /// 校验启动条件，返回第一个缺失的字段
    pub fn validate(&self) -> BusResult<()> {
        if self.client.is_none() {
            return Err(missing_client());
        }
        self.config.validate()
    }

    /// 确保主题存在、创建并订阅两个消费者、启动两条消费循环
    pub async fn start(self) -> BusResult<ListenerHandle> {
        let Some(client) = self.client.clone() else {
            return Err(missing_client());
        };
        self.config.validate()?;

        let exclusive_topic = self.config.exclusive_topic_name();
        let broadcast_topic = self.config.broadcast_topic_name();

        ensure_topic(client.as_ref(), &exclusive_topic).await?;
        ensure_topic(client.as_ref(), &broadcast_topic).await?;

        let mut exclusive = client.consumer(&self.config.exclusive_group_id()).await?;
        let broadcast_group_id = self.config.broadcast_group_id();
        let mut broadcast = match client.consumer(&broadcast_group_id).await {
            Ok(consumer) => consumer,
            Err(err) => {
                exclusive.stop().await;
                return Err(err);
            }
        };

        let subscribed = async {
            exclusive.subscribe(&exclusive_topic, true).await?;
            broadcast.subscribe(&broadcast_topic, false).await
        }
        .await;
        if let Err(err) = subscribed {
            // 启动失败时释放已创建的消费者
            exclusive.stop().await;
            broadcast.stop().await;
            return Err(err);
        }

        let token = CancellationToken::new();
        let (ready_tx, ready_rx) = watch::channel(false);

        let tasks = vec![
            tokio::spawn(consume_loop(
                Channel::Exclusive,
                exclusive,
                self.registry.clone(),
                token.clone(),
                ready_rx.clone(),
            )),
            tokio::spawn(consume_loop(
                Channel::Broadcast,
                broadcast,
                self.registry.clone(),
                token.clone(),
                ready_rx,
            )),
        ];

        tracing::info!(
            app_name = %self.config.app_name,
            exclusive_topic = %exclusive_topic,
            broadcast_topic = %broadcast_topic,
            broadcast_group_id = %broadcast_group_id,
            "listener started"
        );

        Ok(ListenerHandle {
            token,
            ready: ready_tx,
            tasks,
            broadcast_group_id,
        })
    }
}

fn missing_client() -> BusError {
    BusError::configuration("broker_client", "broker client is not set")
}

async fn ensure_topic(client: &dyn BrokerClient, topic: &str) -> BusResult<()> {
    if client.topics().await?.contains(topic) {
        return Ok(());
    }

    match client.create_topic(topic).await {
        Ok(()) => {
            tracing::info!(topic, "topic created");
            Ok(())
        }
        // 其他实例抢先创建
        Err(BusError::TopicAlreadyExists { .. }) => {
            tracing::warn!(topic, "topic already exists");
            Ok(())
        }
        Err(err) => Err(err),
    }
}

async fn consume_loop(
    channel: Channel,
    mut consumer: Box<dyn BrokerConsumer>,
    registry: CallbackRegistry,
    token: CancellationToken,
    mut ready: watch::Receiver<bool>,
) {
    let is_ready = tokio::select! {
        _ = token.cancelled() => false,
        res = ready.wait_for(|r| *r) => res.is_ok(),
    };

    if is_ready {
        tracing::info!(%channel, group_id = consumer.group_id(), "consuming messages");

        loop {
            let next = tokio::select! {
                _ = token.cancelled() => break,
                next = consumer.next_record() => next,
            };

            match next {
                Some(Ok(record)) => dispatch(channel, &registry, &record).await,
                Some(Err(err)) => {
                    tracing::error!(%channel, error = %err, "failed to fetch message");
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = tokio::time::sleep(BROKER_ERROR_BACKOFF) => {}
                    }
                }
                None => {
                    tracing::info!(%channel, "consumer closed");
                    break;
                }
            }
        }
    }

    consumer.stop().await;
    tracing::debug!(%channel, "consumer stopped");
}

async fn dispatch(channel: Channel, registry: &CallbackRegistry, record: &BrokerRecord) {
    tracing::debug!(
        %channel,
        topic = %record.topic,
        offset = record.offset,
        "received message"
    );

    let message = match InboundMessage::from_record(record, channel) {
        Ok(message) => message,
        Err(err) => {
            tracing::error!(
                %channel,
                topic = %record.topic,
                offset = record.offset,
                error = %err,
                "failed to decode message"
            );
            return;
        }
    };

    let handlers = registry.lookup(message.event_type());
    if handlers.is_empty() {
        tracing::debug!(%channel, event_type = message.event_type(), "no handlers registered");
        return;
    }

    for handler in handlers {
        let outcome = AssertUnwindSafe(handler.handle(&message))
            .catch_unwind()
            .await;

        let reason = match outcome {
            Ok(Ok(())) => continue,
            Ok(Err(err)) => format!("{err:#}"),
            Err(panic) => format!("panicked: {}", panic_message(panic.as_ref())),
        };

        let err = BusError::Handler {
            handler: handler.handler_name().to_string(),
            reason,
        };
        tracing::error!(
            %channel,
            event_type = message.event_type(),
            offset = message.offset(),
            error = %err,
            "failed to process message"
        );
    }
}

/// 运行中的监听器：用于打开就绪屏障、关闭与等待任务结束
pub struct ListenerHandle {
    token: CancellationToken,
    ready: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    broadcast_group_id: String,
}

impl ListenerHandle {
    /// 声明处理器已全部注册，两条循环开始消费
    pub fn ready(&self) {
        self.ready.send_replace(true);
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    pub fn state(&self) -> ListenerState {
        ListenerState::Running
    }

    /// 本进程广播通道使用的消费组 ID
    pub fn broadcast_group_id(&self) -> &str {
        &self.broadcast_group_id
    }

    /// 停止两条循环；循环退出时释放消费者
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    pub async fn join(mut self) {
        let tasks = std::mem::take(&mut self.tasks);

        for t in tasks {
            let _ = t.await;
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::InMemoryBroker;

    #[test]
    fn missing_client_is_reported_first() {
        let listener = Listener::builder()
            .config(BusConfig::builder().app_name("").build())
            .build();

        assert_eq!(listener.state(), ListenerState::Uninitialized);
        match listener.validate() {
            Err(BusError::Configuration { field, .. }) => assert_eq!(field, "broker_client"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn start_fails_fast_on_missing_app_name() {
        let broker = Arc::new(InMemoryBroker::new());
        let mut listener = Listener::new(broker.clone(), BusConfig::default());
        listener.configure(|cfg| cfg.app_name = String::new());

        match listener.start().await {
            Err(BusError::Configuration { field, .. }) => assert_eq!(field, "app_name"),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("listener must not start without an app name"),
        }
        assert_eq!(broker.active_consumers(), 0);
        assert!(broker.topics().await.unwrap().is_empty());
    }

    #[test]
    fn configure_changes_only_the_private_copy() {
        let shared = BusConfig::builder().app_name("billing").build();
        let mut listener = Listener::new(Arc::new(InMemoryBroker::new()), shared.clone());
        listener.configure(|cfg| cfg.app_name = "billing-worker".into());

        assert_eq!(listener.config().app_name, "billing-worker");
        assert_eq!(shared.app_name, "billing");
        assert_eq!(listener.state(), ListenerState::Configured);
    }
}
