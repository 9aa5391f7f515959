use crate::event::Event;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// 按主题保存的已发布事件，用于调试与保留期清理
///
/// 使用独立的读写锁，避免发布时的订阅匹配被历史记录维护串行化。
#[derive(Debug, Default)]
pub(super) struct EventHistory {
    by_topic: RwLock<HashMap<String, Vec<Arc<Event>>>>,
}

impl EventHistory {
    pub(super) fn append(&self, event: Arc<Event>) {
        let mut guard = self.by_topic.write().unwrap_or_else(|e| e.into_inner());
        guard
            .entry(event.topic().to_string())
            .or_default()
            .push(event);
    }

    pub(super) fn topic(&self, topic: &str) -> Vec<Arc<Event>> {
        let guard = self.by_topic.read().unwrap_or_else(|e| e.into_inner());
        guard.get(topic).cloned().unwrap_or_default()
    }

    /// 移除早于 `cutoff` 创建的事件，返回移除数量；清空的主题一并删除
    pub(super) fn prune_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut guard = self.by_topic.write().unwrap_or_else(|e| e.into_inner());
        let mut removed = 0;
        guard.retain(|_, events| {
            let before = events.len();
            events.retain(|ev| *ev.created_at() >= cutoff);
            removed += before - events.len();
            !events.is_empty()
        });
        removed
    }
}
