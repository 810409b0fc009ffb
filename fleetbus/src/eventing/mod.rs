//! 事件子系统（eventing）
//!
//! 提供按事件类型订阅与处理的运行时：
//! - `EventHandler`：对入站消息进行消费处理；
//! - `CallbackRegistry`：事件类型到有序处理器列表的映射；
//! - `Processor`：每条消息一个实例、带有界重试的处理器基座；
//! - `Listener`：编排独占/广播两条消费循环，解码并分发到处理器。
//!
//! 该模块只依赖 `broker` 中的能力接口，不绑定具体 broker 实现。
//!
pub mod handler;
pub mod listener;
pub mod processor;
pub mod registry;

pub use handler::{EventHandler, FnHandler, handler_fn};
pub use listener::{Listener, ListenerHandle, ListenerState};
pub use processor::{
    Processor, ProcessorHandler, ProcessorOptions, ProcessorSpec, RetryDelay, TokioDelay,
};
pub use registry::CallbackRegistry;
