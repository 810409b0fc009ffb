//! 事件处理器（EventHandler）
//!
//! 注册在某个事件类型上的处理逻辑。处理器返回的错误只会被记录，
//! 不会中断消费循环，也不会阻止同一消息上后续处理器的执行。
//!
use crate::message::InboundMessage;
use std::any::Any;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

/// 事件处理器：处理某一类型的事件
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// 处理器名称（用于日志）
    fn handler_name(&self) -> &str;
    /// 处理事件
    async fn handle(&self, message: &InboundMessage) -> anyhow::Result<()>;
}

/// 以异步闭包实现的处理器，见 [`handler_fn`]
pub struct FnHandler<F> {
    name: String,
    f: F,
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(InboundMessage) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    fn handler_name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, message: &InboundMessage) -> anyhow::Result<()> {
        (self.f)(message.clone()).await
    }
}

/// 将异步闭包包装为可注册的处理器
///
/// 返回的 `Arc` 同时是注销时的身份标识，需要注销时请保留它。
pub fn handler_fn<F, Fut>(name: impl Into<String>, f: F) -> Arc<dyn EventHandler>
where
    F: Fn(InboundMessage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(FnHandler {
        name: name.into(),
        f,
    })
}

/// 从 panic 负载中取出可读信息
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
