//! 事件总线统一错误定义
//!
//! 覆盖生命周期状态、参数校验、订阅归属、配置解析与关闭超时等最小必要集合。
//! 背压导致的丢弃不属于错误：发布仍然返回成功，仅计入 dropped 计数。
//!
use std::time::Duration;
use thiserror::Error;

/// 统一错误类型
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum BusError {
    // --- 生命周期 ---
    #[error("engine not started: engine={engine}")]
    NotStarted { engine: String },
    #[error("shutdown timed out: engine={engine}, waited={waited:?}")]
    ShutdownTimeout { engine: String, waited: Duration },
    #[error("shutdown cancelled by caller: engine={engine}, elapsed={elapsed:?}")]
    ShutdownCancelled { engine: String, elapsed: Duration },

    // --- 参数 ---
    #[error("invalid topic: {reason}")]
    InvalidTopic { reason: String },
    #[error("wrong subscription type: engine={engine}, subscription={subscription}")]
    WrongSubscriptionType {
        engine: String,
        subscription: String,
    },

    // --- 配置 ---
    #[error("invalid config: {reason}")]
    InvalidConfig { reason: String },
    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },

    // --- 适配器 ---
    #[error("engine error: engine={engine}, reason={reason}")]
    Engine { engine: String, reason: String },
}

/// 统一 Result 类型别名
pub type BusResult<T> = Result<T, BusError>;

impl BusError {
    pub fn not_started(engine: impl Into<String>) -> Self {
        Self::NotStarted {
            engine: engine.into(),
        }
    }

    pub fn invalid_topic(reason: impl Into<String>) -> Self {
        Self::InvalidTopic {
            reason: reason.into(),
        }
    }

    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// 是否为"订阅不属于本引擎"错误（路由器据此继续尝试下一个引擎）
    pub fn is_wrong_subscription(&self) -> bool {
        matches!(self, Self::WrongSubscriptionType { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let err = BusError::ShutdownTimeout {
            engine: "mem".into(),
            waited: Duration::from_millis(50),
        };
        assert_eq!(
            err.to_string(),
            "shutdown timed out: engine=mem, waited=50ms"
        );

        let err = BusError::not_started("mem");
        assert_eq!(err.to_string(), "engine not started: engine=mem");
    }

    #[test]
    fn serde_errors_convert() {
        let parse = serde_json::from_str::<u32>("\"x\"").unwrap_err();
        let err: BusError = parse.into();
        assert!(matches!(err, BusError::Serde { .. }));
        assert!(!err.is_wrong_subscription());
    }
}
