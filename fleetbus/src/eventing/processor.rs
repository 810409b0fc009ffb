//! 带重试的处理器基座（Processor）
//!
//! 每个处理器类型声明自己的事件类型与失败容忍度（`ProcessorOptions`）。
//! 每条消息都会构造一个新的处理器实例，失败后按选项在原地重试：
//! 重试等待发生在消费循环的当前轮次内，会阻塞该通道后续消息。
//! 重试耗尽（或未开启重试）后记录错误并丢弃，不向上传播。
//! `on_event` 中的 panic 与返回错误一样计为一次失败的尝试。
//!
use super::EventHandler;
use super::handler::panic_message;
use crate::message::InboundMessage;
use async_trait::async_trait;
use futures_util::FutureExt;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

/// 处理器类型级别的失败选项
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProcessorOptions {
    /// 是否在失败后重试
    pub retry: bool,
    /// 开启重试时的最大尝试次数（含首次），至少执行一次
    pub max_attempts: u32,
    /// 两次尝试之间的等待
    pub retry_delay: Duration,
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self {
            retry: false,
            max_attempts: 3,
            retry_delay: Duration::from_secs(5),
        }
    }
}

impl ProcessorOptions {
    /// 单条消息最多调用 `on_event` 的次数
    pub fn total_attempts(&self) -> u32 {
        if self.retry {
            self.max_attempts.max(1)
        } else {
            1
        }
    }
}

/// 处理器的声明部分，通常由 `#[processor(...)]` 生成
pub trait ProcessorSpec: Send + Sync + Sized + 'static {
    /// 订阅的事件类型，启动注册时求值一次
    fn event_type() -> String;

    fn options() -> ProcessorOptions {
        ProcessorOptions::default()
    }

    /// 为一条消息构造新的处理器实例
    fn from_message(message: InboundMessage) -> Self;

    fn message(&self) -> &InboundMessage;
}

/// 处理器的行为部分
#[async_trait]
pub trait Processor: ProcessorSpec {
    async fn on_event(&self) -> anyhow::Result<()>;
}

/// 重试等待，测试中可替换为假时钟
#[async_trait]
pub trait RetryDelay: Send + Sync {
    async fn wait(&self, delay: Duration);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TokioDelay;

#[async_trait]
impl RetryDelay for TokioDelay {
    async fn wait(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// 将 `Processor` 适配为可注册的 `EventHandler`
pub struct ProcessorHandler<P> {
    name: String,
    delay: Arc<dyn RetryDelay>,
    _processor: PhantomData<fn() -> P>,
}

impl<P: Processor> ProcessorHandler<P> {
    pub fn new(delay: Arc<dyn RetryDelay>) -> Self {
        Self {
            name: std::any::type_name::<P>().to_string(),
            delay,
            _processor: PhantomData,
        }
    }
}

#[async_trait]
impl<P: Processor> EventHandler for ProcessorHandler<P> {
    fn handler_name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, message: &InboundMessage) -> anyhow::Result<()> {
        let options = P::options();
        let total = options.total_attempts();
        let mut attempt: u32 = 0;

        tracing::debug!(handler = %self.name, event_type = message.event_type(), "processing event");

        loop {
            attempt += 1;
            let processor = P::from_message(message.clone());

            let outcome = AssertUnwindSafe(processor.on_event())
                .catch_unwind()
                .await;
            let reason = match outcome {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(err)) => format!("{err:#}"),
                Err(panic) => format!("panicked: {}", panic_message(panic.as_ref())),
            };

            tracing::error!(
                handler = %self.name,
                event_type = message.event_type(),
                attempt,
                error = %reason,
                "error processing event"
            );

            if attempt >= total {
                tracing::error!(
                    handler = %self.name,
                    event_type = message.event_type(),
                    attempts = attempt,
                    "failed to process event, dropping it"
                );
                return Ok(());
            }

            self.delay.wait(options.retry_delay).await;
        }
    }
}
