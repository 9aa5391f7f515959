use super::EngineShared;
use crate::error::BusResult;
use crate::event::Event;
use crate::eventing::{EventHandler, Subscription};
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};
use uuid::Uuid;

/// 内存引擎签发的订阅
///
/// 持有自己的有界投递队列发送端；接收端归属该订阅的投递工作者。
/// 取消是单调的：`cancelled` 一旦置位便不会恢复。
pub struct MemorySubscription {
    id: String,
    topic: String,
    is_async: bool,
    engine_id: Uuid,
    handler: Arc<dyn EventHandler>,
    queue: mpsc::Sender<Arc<Event>>,
    cancelled: AtomicBool,
    cancel_token: CancellationToken,
    // 投递工作者退出时被取消
    finished: CancellationToken,
    engine: Weak<EngineShared>,
}

impl MemorySubscription {
    pub(super) fn new(
        engine: &Arc<EngineShared>,
        topic: &str,
        is_async: bool,
        handler: Arc<dyn EventHandler>,
        queue: mpsc::Sender<Arc<Event>>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            topic: topic.to_string(),
            is_async,
            engine_id: engine.id,
            handler,
            queue,
            cancelled: AtomicBool::new(false),
            cancel_token: CancellationToken::new(),
            finished: CancellationToken::new(),
            engine: Arc::downgrade(engine),
        }
    }

    pub(super) fn engine_id(&self) -> Uuid {
        self.engine_id
    }

    pub(super) fn handler(&self) -> &Arc<dyn EventHandler> {
        &self.handler
    }

    pub(super) fn queue(&self) -> &mpsc::Sender<Arc<Event>> {
        &self.queue
    }

    /// 置位取消标记；仅首次置位返回 true
    pub(super) fn mark_cancelled(&self) -> bool {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.cancel_token.cancel();
        true
    }

    pub(super) async fn cancelled(&self) {
        self.cancel_token.cancelled().await
    }

    /// 由投递工作者持有，工作者退出（含 panic 展开）时通知等待方
    pub(super) fn finished_guard(&self) -> DropGuard {
        self.finished.clone().drop_guard()
    }

    pub(super) async fn finished(&self) {
        self.finished.cancelled().await
    }
}

impl Subscription for MemorySubscription {
    fn id(&self) -> &str {
        &self.id
    }

    fn topic(&self) -> &str {
        &self.topic
    }

    fn is_async(&self) -> bool {
        self.is_async
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn cancel(&self) -> BusResult<()> {
        if self.mark_cancelled() {
            if let Some(engine) = self.engine.upgrade() {
                engine.detach(self);
            }
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Debug for MemorySubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySubscription")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .field("is_async", &self.is_async)
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}
