//! 事件（Event）
//!
//! 总线上传递的消息：主题用于路由与匹配，载荷对引擎不透明。
//! 创建时间由发布引擎写入，处理开始/完成时间由投递工作者在调用处理器前后追加。
//!
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 元数据中记录发布引擎名称的键
pub const ENGINE_METADATA_KEY: &str = "engine";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    topic: String,
    payload: Value,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    metadata: Map<String, Value>,
    created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    processing_started: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    processing_completed: Option<DateTime<Utc>>,
}

impl Event {
    pub fn new(topic: impl Into<String>, payload: impl Into<Value>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            metadata: Map::new(),
            created_at: Utc::now(),
            processing_started: None,
            processing_completed: None,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn metadata_value(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    pub fn created_at(&self) -> &DateTime<Utc> {
        &self.created_at
    }

    pub fn processing_started(&self) -> Option<&DateTime<Utc>> {
        self.processing_started.as_ref()
    }

    pub fn processing_completed(&self) -> Option<&DateTime<Utc>> {
        self.processing_completed.as_ref()
    }

    /// 发布时由引擎调用：覆盖创建时间，并在调用方未指定时标记来源引擎
    pub fn stamp_published(&mut self, engine: &str, at: DateTime<Utc>) {
        self.created_at = at;
        self.processing_started = None;
        self.processing_completed = None;
        self.metadata
            .entry(ENGINE_METADATA_KEY)
            .or_insert_with(|| Value::String(engine.to_string()));
    }

    pub fn mark_processing_started(&mut self, at: DateTime<Utc>) {
        self.processing_started = Some(at);
    }

    pub fn mark_processing_completed(&mut self, at: DateTime<Utc>) {
        self.processing_completed = Some(at);
    }

    /// 事件自创建以来经过的时长；时钟回拨时视为 0
    pub fn age(&self, now: DateTime<Utc>) -> std::time::Duration {
        (now - self.created_at).to_std().unwrap_or_default()
    }
}
