//! 投递工作者与异步工作池
//!
//! 每个订阅一个长驻投递工作者，按入队顺序消费自己的队列；
//! 异步订阅的处理器调用再交给固定大小的共享工作池执行。
//!
use super::subscription::MemorySubscription;
use super::{EngineShared, Runtime};
use crate::context::BusContext;
use crate::event::Event;
use crate::eventing::{DropReason, Subscription};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

/// 交给工作池的一次处理器调用
pub(super) struct PoolTask {
    sub: Arc<MemorySubscription>,
    event: Arc<Event>,
}

pub(super) type PoolQueue = Arc<Mutex<mpsc::Receiver<PoolTask>>>;

pub(super) async fn dispatch_loop(
    shared: Arc<EngineShared>,
    sub: Arc<MemorySubscription>,
    mut queue: mpsc::Receiver<Arc<Event>>,
    runtime: Runtime,
) {
    let _finished = sub.finished_guard();
    let ttl = shared.config.event_ttl;

    loop {
        let event = tokio::select! {
            biased;
            _ = runtime.token.cancelled() => break,
            _ = sub.cancelled() => break,
            next = queue.recv() => match next {
                Some(event) => event,
                None => break,
            },
        };

        // 退订前刚入队的事件静默丢弃
        if sub.is_cancelled() {
            continue;
        }
        if !ttl.is_zero() && event.age(Utc::now()) > ttl {
            shared.record_drop(&sub, event.topic(), DropReason::Expired);
            continue;
        }

        if sub.is_async() {
            let task = PoolTask {
                sub: sub.clone(),
                event,
            };
            if let Err(err) = runtime.pool.try_send(task) {
                let task = err.into_inner();
                shared.record_drop(&task.sub, task.event.topic(), DropReason::PoolSaturated);
            }
        } else {
            shared.deliver(&runtime.handler_ctx, &sub, &event).await;
        }
    }
}

pub(super) async fn pool_worker(
    shared: Arc<EngineShared>,
    tasks: PoolQueue,
    token: CancellationToken,
    ctx: BusContext,
) {
    loop {
        let next = {
            let mut rx = tasks.lock().await;
            tokio::select! {
                biased;
                _ = token.cancelled() => None,
                task = rx.recv() => task,
            }
        };
        let Some(task) = next else {
            break;
        };
        if task.sub.is_cancelled() {
            continue;
        }
        shared.deliver(&ctx, &task.sub, &task.event).await;
    }
}
