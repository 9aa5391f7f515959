//! 生命周期与投递通知
//!
//! 引擎通过可选注入的 [`NotificationSink`] 向外部框架报告主题、订阅与消息的变化。
//! 通知是尽力而为的：未注入时直接跳过，注入方返回错误也不会影响发布/订阅结果。
//!
use crate::event::Event;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// 消息被丢弃的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// 订阅队列已满（drop 模式或零超时）
    QueueFull,
    /// timeout 模式下等待超时
    Timeout,
    /// 阻塞等待期间调用方上下文被取消
    Cancelled,
    /// 异步工作池队列已满
    PoolSaturated,
    /// 出队时已超过 eventTTL
    Expired,
    /// 订阅队列已关闭
    Closed,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::QueueFull => "queue full",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::PoolSaturated => "worker pool saturated",
            Self::Expired => "expired",
            Self::Closed => "queue closed",
        };
        f.write_str(s)
    }
}

#[non_exhaustive]
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BusNotification {
    EngineStarted {
        engine: String,
    },
    EngineStopped {
        engine: String,
    },
    TopicCreated {
        engine: String,
        topic: String,
    },
    TopicDeleted {
        engine: String,
        topic: String,
    },
    SubscriptionCreated {
        engine: String,
        topic: String,
        subscription: String,
        is_async: bool,
    },
    SubscriptionRemoved {
        engine: String,
        topic: String,
        subscription: String,
    },
    MessagePublished {
        engine: String,
        topic: String,
        matched: usize,
    },
    /// 处理器成功执行；携带带有处理时间戳的事件
    MessageReceived {
        engine: String,
        subscription: String,
        event: Event,
    },
    MessageFailed {
        engine: String,
        subscription: String,
        topic: String,
        reason: String,
    },
    MessageDropped {
        engine: String,
        subscription: String,
        topic: String,
        reason: DropReason,
    },
}

/// 通知接收方：单一的追加能力
pub trait NotificationSink: Send + Sync {
    fn append(&self, notification: BusNotification) -> anyhow::Result<()>;
}

/// 引擎内部持有的通知发射器
#[derive(Clone, Default)]
pub struct Notifier {
    sink: Option<Arc<dyn NotificationSink>>,
}

impl Notifier {
    pub fn new(sink: Option<Arc<dyn NotificationSink>>) -> Self {
        Self { sink }
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    /// 延迟构造通知，未注入 sink 时不产生任何开销
    pub fn emit(&self, build: impl FnOnce() -> BusNotification) {
        let Some(sink) = &self.sink else {
            return;
        };
        if let Err(err) = sink.append(build()) {
            tracing::debug!(error = %err, "notification sink rejected notification");
        }
    }
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<BusNotification>>,
    }
    impl NotificationSink for Recording {
        fn append(&self, notification: BusNotification) -> anyhow::Result<()> {
            self.seen.lock().unwrap().push(notification);
            Ok(())
        }
    }

    struct Failing;
    impl NotificationSink for Failing {
        fn append(&self, _notification: BusNotification) -> anyhow::Result<()> {
            anyhow::bail!("sink offline")
        }
    }

    #[test]
    fn disabled_notifier_never_builds() {
        let notifier = Notifier::default();
        notifier.emit(|| panic!("must not be built"));
        assert!(!notifier.is_enabled());
    }

    #[test]
    fn sink_receives_notifications() {
        let sink = Arc::new(Recording::default());
        let notifier = Notifier::new(Some(sink.clone()));
        notifier.emit(|| BusNotification::EngineStarted {
            engine: "mem".into(),
        });
        let seen = sink.seen.lock().unwrap();
        assert!(matches!(&seen[..], [BusNotification::EngineStarted { engine }] if engine == "mem"));
    }

    #[test]
    fn sink_errors_are_swallowed() {
        let notifier = Notifier::new(Some(Arc::new(Failing)));
        notifier.emit(|| BusNotification::EngineStopped {
            engine: "mem".into(),
        });
    }

    #[test]
    fn serializes_with_kind_tag() {
        let n = BusNotification::MessageDropped {
            engine: "mem".into(),
            subscription: "s-1".into(),
            topic: "a".into(),
            reason: DropReason::PoolSaturated,
        };
        let v = serde_json::to_value(&n).unwrap();
        assert_eq!(v["kind"], "message_dropped");
        assert_eq!(v["reason"], "pool_saturated");
    }
}
