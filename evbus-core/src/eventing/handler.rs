//! 事件处理器（EventHandler）
//!
//! 订阅方提供的处理逻辑。无论引擎是在订阅的投递工作者上内联执行，
//! 还是交给共享工作池异步执行，处理器看到的签名都相同。
//!
use crate::context::BusContext;
use crate::event::Event;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

/// 事件处理器：处理一条已匹配的事件
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// 处理事件；返回错误只会被记录与通知，不会影响发布方或停止投递
    async fn handle(&self, ctx: &BusContext, event: &Event) -> anyhow::Result<()>;
}

/// 以闭包实现的处理器，见 [`handler_fn`]
pub struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(BusContext, Event) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn handle(&self, ctx: &BusContext, event: &Event) -> anyhow::Result<()> {
        (self.f)(ctx.clone(), event.clone()).await
    }
}

/// 将异步闭包包装为 `Arc<dyn EventHandler>`
///
/// ```rust
/// use evbus_core::eventing::handler_fn;
///
/// let handler = handler_fn(|_ctx, event| async move {
///     println!("got {}", event.topic());
///     Ok(())
/// });
/// # let _ = handler;
/// ```
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(BusContext, Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(FnHandler { f })
}
