//! 事件总线统一错误定义
//!
//! 覆盖启动配置、信封编解码、发布参数、处理器与 broker 交互的最小必要集合。
//! 只有 `Configuration` 会在启动阶段中止进程；其余错误在消费循环内被记录并吞掉，
//! 或同步返回给发布方。
//!
use thiserror::Error;

/// 统一错误类型
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum BusError {
    // --- 启动配置 ---
    #[error("configuration error: field={field}, reason={reason}")]
    Configuration { field: &'static str, reason: String },

    // --- 信封编解码 ---
    #[error("encoding error: {reason}")]
    Encoding { reason: String },
    #[error("decoding error: {reason}")]
    Decoding { reason: String },

    // --- 发布参数 ---
    #[error("invalid argument: {reason}")]
    Argument { reason: String },

    // --- 处理器 ---
    #[error("event handler error: handler={handler}, reason={reason}")]
    Handler { handler: String, reason: String },

    // --- broker ---
    #[error("broker error: {reason}")]
    Broker { reason: String },
    #[error("topic already exists: {topic}")]
    TopicAlreadyExists { topic: String },
}

impl BusError {
    pub fn configuration(field: &'static str, reason: impl Into<String>) -> Self {
        BusError::Configuration {
            field,
            reason: reason.into(),
        }
    }

    pub fn decoding(reason: impl Into<String>) -> Self {
        BusError::Decoding {
            reason: reason.into(),
        }
    }

    pub fn argument(reason: impl Into<String>) -> Self {
        BusError::Argument {
            reason: reason.into(),
        }
    }

    pub fn broker(reason: impl Into<String>) -> Self {
        BusError::Broker {
            reason: reason.into(),
        }
    }
}

/// 统一 Result 类型别名
pub type BusResult<T> = Result<T, BusError>;

// 入站消息解析失败统一归为解码错误；编码路径显式映射为 `Encoding`
impl From<serde_json::Error> for BusError {
    fn from(err: serde_json::Error) -> Self {
        BusError::Decoding {
            reason: err.to_string(),
        }
    }
}
