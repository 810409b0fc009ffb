//! 处理器类型名 → 事件类型名
//!
//! `billing::InvoicePaidProcessor` → `billing.invoice_paid`：
//! 按 `::` 切分路径段，每段 CamelCase 转 snake_case，去掉末段的 `_processor` 后缀，
//! 再以 `.` 连接。结果只取决于输入字符串，可在启动时安全地重复计算。

const PROCESSOR_SUFFIX: &str = "_processor";

pub fn event_type_name(type_path: &str) -> String {
    let mut segments: Vec<String> = type_path
        .split("::")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(snake_case)
        .collect();

    if let Some(last) = segments.last_mut() {
        if last.len() > PROCESSOR_SUFFIX.len() && last.ends_with(PROCESSOR_SUFFIX) {
            last.truncate(last.len() - PROCESSOR_SUFFIX.len());
        }
    }

    segments.join(".")
}

fn snake_case(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len() + 4);
    let mut prev: Option<char> = None;

    for ch in segment.chars() {
        if ch.is_uppercase() {
            // 仅在小写/数字之后断词，连续大写（如 `HTTPProbe`）不逐字母拆分
            if matches!(prev, Some(p) if p.is_lowercase() || p.is_ascii_digit()) {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
        prev = Some(ch);
    }

    out
}
