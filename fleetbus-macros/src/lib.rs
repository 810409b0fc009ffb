use proc_macro::TokenStream;

mod field_utils;
mod processor;

/// 处理器宏
/// - 追加字段：`message: ::fleetbus::InboundMessage`（若缺失）
/// - 自动为目标结构体实现 `::fleetbus::eventing::ProcessorSpec`
///   （`event_type/options/from_message/message`），行为部分仍需手写 `Processor`
/// - 支持参数：
///   - `event_type = "billing.invoice_paid"`：直接指定事件类型
///   - `namespace = "billing"`：按 `billing::TypeName` 推导事件类型（与 `event_type` 互斥）
///   - `retry` / `retry = false`：失败后是否重试，默认不重试
///   - `max_attempts = 3`：开启重试时的最大尝试次数（含首次）
///   - `retry_delay_ms = 5000`：两次尝试之间的等待
/// - 未指定事件类型时按类型名推导：`InvoicePaidProcessor` → `invoice_paid`
/// - 其余字段在每条消息构造实例时取 `Default::default()`
#[proc_macro_attribute]
pub fn processor(attr: TokenStream, item: TokenStream) -> TokenStream {
    processor::expand(attr, item)
}
