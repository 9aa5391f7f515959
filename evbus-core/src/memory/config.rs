use crate::error::{BusError, BusResult};
use crate::eventing::EngineSettings;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// 历史清理周期的上限；更大的值会让定时器的截止时间溢出
pub const MAX_CLEANUP_INTERVAL: Duration = Duration::from_secs(365 * 86_400);

/// 订阅队列已满时的准入策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// 非阻塞尝试，失败即丢弃
    #[default]
    Drop,
    /// 等待队列空位，直到调用方上下文取消
    Block,
    /// 最多等待 `publish_block_timeout`，零表示只尝试一次
    Timeout,
}

/// 内存引擎配置
///
/// 所有键都有默认值；未知键（例如外部 broker 的连接信息）会被忽略，
/// 以便旧版单引擎配置整体透传给引擎。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MemoryEngineConfig {
    /// 异步工作池共享任务队列的容量
    pub max_event_queue_size: usize,
    /// 每个订阅的投递队列容量
    pub default_event_buffer_size: usize,
    /// 异步工作池的工作者数量
    pub worker_count: usize,
    /// 事件出队时允许的最大年龄，零表示不过期
    #[serde(rename = "eventTTL", with = "crate::duration")]
    pub event_ttl: Duration,
    /// 历史记录保留天数
    pub retention_days: u32,
    pub delivery_mode: DeliveryMode,
    #[serde(with = "crate::duration")]
    pub publish_block_timeout: Duration,
    /// 按发布序号轮转订阅者顺序，避免固定的先后次序
    pub rotate_subscriber_order: bool,
    /// `stop` 等待在途处理结束的上限
    #[serde(with = "crate::duration")]
    pub shutdown_timeout: Duration,
    /// 历史清理定时器周期
    #[serde(with = "crate::duration")]
    pub cleanup_interval: Duration,
}

impl Default for MemoryEngineConfig {
    fn default() -> Self {
        Self {
            max_event_queue_size: 1000,
            default_event_buffer_size: 10,
            worker_count: 5,
            event_ttl: Duration::from_secs(3_600),
            retention_days: 7,
            delivery_mode: DeliveryMode::Drop,
            publish_block_timeout: Duration::ZERO,
            rotate_subscriber_order: false,
            shutdown_timeout: Duration::from_secs(30),
            cleanup_interval: Duration::from_secs(24 * 3_600),
        }
    }
}

impl MemoryEngineConfig {
    /// 从引擎私有配置解析，并做取值校验
    pub fn from_settings(settings: &EngineSettings) -> BusResult<Self> {
        let config: Self = serde_json::from_value(Value::Object(settings.clone()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> BusResult<()> {
        if self.max_event_queue_size == 0 {
            return Err(BusError::invalid_config("maxEventQueueSize must be >= 1"));
        }
        if self.default_event_buffer_size == 0 {
            return Err(BusError::invalid_config(
                "defaultEventBufferSize must be >= 1",
            ));
        }
        if self.worker_count == 0 {
            return Err(BusError::invalid_config("workerCount must be >= 1"));
        }
        if self.retention_days == 0 {
            return Err(BusError::invalid_config("retentionDays must be >= 1"));
        }
        if self.cleanup_interval.is_zero() {
            return Err(BusError::invalid_config("cleanupInterval must be > 0"));
        }
        if self.cleanup_interval > MAX_CLEANUP_INTERVAL {
            return Err(BusError::invalid_config(
                "cleanupInterval must not exceed 365d",
            ));
        }
        Ok(())
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(u64::from(self.retention_days) * 86_400)
    }
}
