use bon::Builder;
use tokio_util::sync::CancellationToken;

/// 调用上下文（Bus Context）
///
/// 承载一次总线调用（发布/订阅/启停）所需的横切信息：
/// - 关联追踪 `correlation_id`（可选，仅用于日志与通知）；
/// - 取消信号 `cancellation`：阻塞型发布与 `stop` 会与之竞争，
///   取消即视为放弃等待。
///
/// 典型用法：
/// ```rust
/// use evbus_core::context::BusContext;
/// use tokio_util::sync::CancellationToken;
///
/// let token = CancellationToken::new();
/// let ctx = BusContext::builder()
///     .maybe_correlation_id(Some("cor-123".into()))
///     .cancellation(token.clone())
///     .build();
/// assert!(!ctx.is_cancelled());
/// token.cancel();
/// assert!(ctx.is_cancelled());
/// ```
#[derive(Builder, Clone, Debug, Default)]
pub struct BusContext {
    /// 关联ID
    correlation_id: Option<String>,
    /// 取消信号；默认永不取消
    #[builder(default)]
    cancellation: CancellationToken,
}

impl BusContext {
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// 在上下文被取消时完成
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }
}
