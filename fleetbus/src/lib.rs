//! 基于消息 broker 的进程内事件总线（fleetbus）
//!
//! 发布方将类型化事件包装为信封发送到 broker；订阅方按事件类型注册处理器，
//! 消息从两条并行通道到达时被分发：
//! - 独占通道（`exclusive`）：同一服务的多个实例中只有一个会处理某条消息；
//! - 广播通道（`broadcast`）：每个实例都会处理每条消息。
//!
//! 组成：
//! - 信封编解码（`envelope`、`message`）
//! - 回调注册表、监听器与带重试的处理器基座（`eventing`）
//! - 发布器（`publisher`）
//! - broker 能力接口与内存实现（`broker`）
//! - 配置（`config`）与统一错误（`error`）
//!
//! 本 crate 不实现 broker、持久化或网络协议，只编排对注入的 broker 能力的调用。
//!
//! 典型用法：
//! 1. 构造 `BusConfig` 与 broker 客户端；
//! 2. 构造 `Listener`，通过 `on` / `register_processor` 注册处理器；
//! 3. `start` 后在全部处理器注册完成时调用 `ListenerHandle::ready`；
//! 4. 使用 `Publisher` 发布事件，必要时 `flush`。
//!
pub mod broker;
pub mod config;
pub mod envelope;
pub mod error;
pub mod eventing;
pub mod message;
pub mod naming;
pub mod publisher;

pub use config::BusConfig;
pub use envelope::Envelope;
pub use error::{BusError, BusResult};
pub use eventing::{
    CallbackRegistry, EventHandler, Listener, ListenerHandle, Processor, ProcessorOptions,
    ProcessorSpec, handler_fn,
};
pub use message::{Channel, InboundMessage};
pub use publisher::Publisher;

// 允许在本 crate 内部通过 ::fleetbus 进行自引用，
// 以便过程宏在本 crate 的单元测试中也能解析到 ::fleetbus 路径。
extern crate self as fleetbus;
