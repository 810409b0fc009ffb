//! 回调注册表（CallbackRegistry）
//!
//! 事件类型 → 有序处理器列表。注册顺序即调用顺序；同一处理器可重复注册；
//! 注销按 `Arc` 身份（同一分配）匹配，只移除第一个。
//!
//! 注册表可廉价克隆，两条消费循环共享同一份并发读取。应用应在
//! `ListenerHandle::ready` 之前完成全部注册。
//!
use super::EventHandler;
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct CallbackRegistry {
    by_type: Arc<DashMap<String, Vec<Arc<dyn EventHandler>>>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加处理器到该事件类型的列表末尾
    pub fn register(&self, event_type: impl Into<String>, handler: Arc<dyn EventHandler>) {
        self.by_type
            .entry(event_type.into())
            .or_default()
            .push(handler);
    }

    /// 注销第一个与 `handler` 为同一分配的处理器；不存在时返回 false
    pub fn unregister(&self, event_type: &str, handler: &Arc<dyn EventHandler>) -> bool {
        let Some(mut list) = self.by_type.get_mut(event_type) else {
            return false;
        };

        let Some(pos) = list.iter().position(|h| same_handler(h, handler)) else {
            return false;
        };
        list.remove(pos);

        let now_empty = list.is_empty();
        drop(list);
        if now_empty {
            self.by_type.remove_if(event_type, |_, l| l.is_empty());
        }
        true
    }

    /// 该事件类型的处理器快照（按注册顺序）；未注册时为空
    pub fn lookup(&self, event_type: &str) -> Vec<Arc<dyn EventHandler>> {
        self.by_type
            .get(event_type)
            .map(|list| list.value().clone())
            .unwrap_or_default()
    }

    /// 已注册处理器的事件类型
    pub fn event_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.by_type.iter().map(|e| e.key().clone()).collect();
        types.sort();
        types
    }

    /// 全部事件类型下的处理器总数
    pub fn len(&self) -> usize {
        self.by_type.iter().map(|e| e.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// 只比较数据指针，忽略 vtable（同一类型在不同代码生成单元中可能有不同 vtable）
fn same_handler(a: &Arc<dyn EventHandler>, b: &Arc<dyn EventHandler>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
