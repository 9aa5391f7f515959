//! 内存投递引擎（MemoryEngine）
//!
//! 参考实现，满足 `EventEngine` 协议：
//! - 主题注册表：模式 → 订阅列表，读写锁保护，发布时在读锁下取匹配快照；
//! - 每个订阅一个有界队列与一个投递工作者，三种准入策略（drop/block/timeout）；
//! - 异步订阅交给固定大小的共享工作池，池满即丢弃；
//! - 按主题保存历史记录，周期性按保留期清理；
//! - 无锁的 delivered/dropped 计数。
//!
//! "delivered" 表示处理器已执行完成（无论成功与否），而不是仅仅入队。
//!
mod config;
mod dispatch;
mod history;
mod subscription;

pub use config::{DeliveryMode, MemoryEngineConfig};
pub use subscription::MemorySubscription;

use self::dispatch::{PoolQueue, PoolTask};
use self::history::EventHistory;
use crate::context::BusContext;
use crate::error::{BusError, BusResult as Result};
use crate::event::Event;
use crate::eventing::topic;
use crate::eventing::{
    BusNotification, DeliveryCounters, DeliveryStats, DropReason, EngineInit, EventEngine,
    EventHandler, NotificationSink, Notifier, Subscription,
};
use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

/// 内存引擎在工厂注册表中的类型名
pub const ENGINE_KIND: &str = "memory";

/// 退订时等待投递工作者退出的上限
const UNSUBSCRIBE_WAIT: Duration = Duration::from_millis(100);

type Registry = BTreeMap<String, Vec<Arc<MemorySubscription>>>;

pub struct MemoryEngine {
    shared: Arc<EngineShared>,
    runtime: Mutex<Option<Runtime>>,
}

/// 引擎与其订阅、工作者之间共享的状态
pub(crate) struct EngineShared {
    id: Uuid,
    name: String,
    config: MemoryEngineConfig,
    registry: RwLock<Registry>,
    history: EventHistory,
    counters: DeliveryCounters,
    notifier: Notifier,
    publish_seq: AtomicU64,
}

/// 一次 start → stop 周期内的运行时资源
#[derive(Clone)]
pub(super) struct Runtime {
    token: CancellationToken,
    tracker: TaskTracker,
    pool: mpsc::Sender<PoolTask>,
    handler_ctx: BusContext,
}

impl MemoryEngine {
    pub fn new(name: impl Into<String>, config: MemoryEngineConfig) -> Result<Self> {
        Self::build(name.into(), config, None)
    }

    /// 供工厂注册表使用：解析引擎私有配置并注入通知出口
    pub fn from_init(init: EngineInit) -> Result<Self> {
        let config = MemoryEngineConfig::from_settings(&init.settings)?;
        Self::build(init.name, config, init.sink)
    }

    fn build(
        name: String,
        config: MemoryEngineConfig,
        sink: Option<Arc<dyn NotificationSink>>,
    ) -> Result<Self> {
        config.validate()?;
        let shared = EngineShared {
            id: Uuid::new_v4(),
            name,
            config,
            registry: RwLock::new(Registry::new()),
            history: EventHistory::default(),
            counters: DeliveryCounters::default(),
            notifier: Notifier::new(sink),
            publish_seq: AtomicU64::new(0),
        };
        Ok(Self {
            shared: Arc::new(shared),
            runtime: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &MemoryEngineConfig {
        &self.shared.config
    }

    pub fn is_started(&self) -> bool {
        self.lock_runtime().is_some()
    }

    /// 某主题的历史事件（按发布顺序）
    pub fn history(&self, topic: &str) -> Vec<Arc<Event>> {
        self.shared.history.topic(topic)
    }

    /// 执行一次保留期清理，返回移除的事件数；定时器运行的也是它
    pub fn prune_history(&self) -> usize {
        self.shared.prune_history()
    }

    fn lock_runtime(&self) -> std::sync::MutexGuard<'_, Option<Runtime>> {
        self.runtime.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn take_runtime(&self) -> Option<Runtime> {
        self.lock_runtime().take()
    }

    fn ensure_started(&self) -> Result<()> {
        if self.is_started() {
            Ok(())
        } else {
            Err(BusError::not_started(&self.shared.name))
        }
    }

    fn runtime(&self) -> Result<Runtime> {
        self.lock_runtime()
            .clone()
            .ok_or_else(|| BusError::not_started(&self.shared.name))
    }

    fn owned<'a>(&self, subscription: &'a dyn Subscription) -> Result<&'a MemorySubscription> {
        match subscription.as_any().downcast_ref::<MemorySubscription>() {
            Some(sub) if sub.engine_id() == self.shared.id => Ok(sub),
            _ => Err(BusError::WrongSubscriptionType {
                engine: self.shared.name.clone(),
                subscription: subscription.id().to_string(),
            }),
        }
    }

    async fn subscribe_with(
        &self,
        topic: &str,
        handler: Arc<dyn EventHandler>,
        is_async: bool,
    ) -> Result<Arc<dyn Subscription>> {
        let runtime = self.runtime()?;
        if topic.trim().is_empty() {
            return Err(BusError::invalid_topic("topic pattern must not be empty"));
        }

        let (tx, rx) = mpsc::channel(self.shared.config.default_event_buffer_size);
        let sub = Arc::new(MemorySubscription::new(
            &self.shared,
            topic,
            is_async,
            handler,
            tx,
        ));
        self.shared.insert(sub.clone());
        runtime.tracker.spawn(dispatch::dispatch_loop(
            self.shared.clone(),
            sub.clone(),
            rx,
            runtime.clone(),
        ));

        // 与并发的 stop 竞争：停止后插入的订阅立即作废
        if runtime.token.is_cancelled() {
            sub.cancel()?;
            return Err(BusError::not_started(&self.shared.name));
        }

        tracing::debug!(
            engine = %self.shared.name,
            topic,
            subscription = sub.id(),
            is_async,
            "subscription created"
        );
        Ok(sub)
    }

    /// 按投递模式尝试放入订阅队列
    async fn admit(
        &self,
        ctx: &BusContext,
        sub: &MemorySubscription,
        event: Arc<Event>,
    ) -> std::result::Result<(), DropReason> {
        let config = &self.shared.config;
        match config.delivery_mode {
            DeliveryMode::Drop => try_enqueue(sub, event),
            DeliveryMode::Timeout if config.publish_block_timeout.is_zero() => {
                try_enqueue(sub, event)
            }
            DeliveryMode::Block => tokio::select! {
                sent = sub.queue().send(event) => sent.map_err(|_| DropReason::Closed),
                _ = ctx.cancelled() => Err(DropReason::Cancelled),
            },
            DeliveryMode::Timeout => tokio::select! {
                sent = time::timeout(config.publish_block_timeout, sub.queue().send(event)) => {
                    match sent {
                        Ok(Ok(())) => Ok(()),
                        Ok(Err(_)) => Err(DropReason::Closed),
                        Err(_) => Err(DropReason::Timeout),
                    }
                }
                _ = ctx.cancelled() => Err(DropReason::Cancelled),
            },
        }
    }

    async fn retention_loop(shared: Arc<EngineShared>, token: CancellationToken) {
        let period = shared.config.cleanup_interval;
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    shared.prune_history();
                }
            }
        }
    }
}

/// 第 `seq` 次发布时订阅者列表的起始偏移
fn rotation_offset(seq: u64, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    (seq % len as u64) as usize
}

fn try_enqueue(sub: &MemorySubscription, event: Arc<Event>) -> std::result::Result<(), DropReason> {
    sub.queue().try_send(event).map_err(|err| match err {
        TrySendError::Full(_) => DropReason::QueueFull,
        TrySendError::Closed(_) => DropReason::Closed,
    })
}

#[async_trait]
impl EventEngine for MemoryEngine {
    fn name(&self) -> &str {
        &self.shared.name
    }

    async fn start(&self, _ctx: &BusContext) -> Result<()> {
        {
            let mut slot = self.lock_runtime();
            if slot.is_some() {
                return Ok(());
            }

            let config = &self.shared.config;
            let token = CancellationToken::new();
            let tracker = TaskTracker::new();
            let handler_ctx = BusContext::builder().cancellation(token.clone()).build();
            let (pool, pool_rx) = mpsc::channel(config.max_event_queue_size);
            let pool_rx: PoolQueue = Arc::new(tokio::sync::Mutex::new(pool_rx));

            for _ in 0..config.worker_count {
                tracker.spawn(dispatch::pool_worker(
                    self.shared.clone(),
                    pool_rx.clone(),
                    token.clone(),
                    handler_ctx.clone(),
                ));
            }
            tracker.spawn(Self::retention_loop(self.shared.clone(), token.clone()));

            *slot = Some(Runtime {
                token,
                tracker,
                pool,
                handler_ctx,
            });
        }

        tracing::info!(
            engine = %self.shared.name,
            workers = self.shared.config.worker_count,
            mode = ?self.shared.config.delivery_mode,
            "memory engine started"
        );
        self.shared.notifier.emit(|| BusNotification::EngineStarted {
            engine: self.shared.name.clone(),
        });
        Ok(())
    }

    async fn stop(&self, ctx: &BusContext) -> Result<()> {
        let Some(runtime) = self.take_runtime() else {
            return Ok(());
        };
        runtime.token.cancel();

        for (topic, subs) in self.shared.drain() {
            for sub in subs {
                if sub.mark_cancelled() {
                    self.shared.notify_removed(&sub);
                }
            }
            self.shared.notifier.emit(|| BusNotification::TopicDeleted {
                engine: self.shared.name.clone(),
                topic,
            });
        }

        runtime.tracker.close();
        let waited = self.shared.config.shutdown_timeout;
        let started = Instant::now();
        let outcome = tokio::select! {
            _ = runtime.tracker.wait() => Ok(()),
            _ = time::sleep(waited) => Err(BusError::ShutdownTimeout {
                engine: self.shared.name.clone(),
                waited,
            }),
            _ = ctx.cancelled() => Err(BusError::ShutdownCancelled {
                engine: self.shared.name.clone(),
                elapsed: started.elapsed(),
            }),
        };
        if let Err(err) = outcome {
            tracing::warn!(
                engine = %self.shared.name,
                in_flight = runtime.tracker.len(),
                error = %err,
                "memory engine shutdown incomplete"
            );
            return Err(err);
        }

        tracing::info!(engine = %self.shared.name, "memory engine stopped");
        self.shared.notifier.emit(|| BusNotification::EngineStopped {
            engine: self.shared.name.clone(),
        });
        Ok(())
    }

    async fn publish(&self, ctx: &BusContext, mut event: Event) -> Result<()> {
        self.ensure_started()?;
        if event.topic().is_empty() {
            return Err(BusError::invalid_topic("topic must not be empty"));
        }

        event.stamp_published(&self.shared.name, Utc::now());
        let event = Arc::new(event);
        self.shared.history.append(event.clone());

        let mut targets = self.shared.matching(event.topic());
        self.shared
            .notifier
            .emit(|| BusNotification::MessagePublished {
                engine: self.shared.name.clone(),
                topic: event.topic().to_string(),
                matched: targets.len(),
            });
        if targets.is_empty() {
            return Ok(());
        }

        if self.shared.config.rotate_subscriber_order && targets.len() > 1 {
            let seq = self.shared.publish_seq.fetch_add(1, Ordering::Relaxed);
            let offset = rotation_offset(seq, targets.len());
            if offset != 0 {
                targets.rotate_left(offset);
            }
        }

        for sub in targets {
            if sub.is_cancelled() {
                continue;
            }
            if let Err(reason) = self.admit(ctx, &sub, event.clone()).await {
                self.shared.record_drop(&sub, event.topic(), reason);
            }
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        _ctx: &BusContext,
        topic: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<Arc<dyn Subscription>> {
        self.subscribe_with(topic, handler, false).await
    }

    async fn subscribe_async(
        &self,
        _ctx: &BusContext,
        topic: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<Arc<dyn Subscription>> {
        self.subscribe_with(topic, handler, true).await
    }

    async fn unsubscribe(&self, _ctx: &BusContext, subscription: &dyn Subscription) -> Result<()> {
        let sub = self.owned(subscription)?;
        sub.cancel()?;
        // 尽量避免退订后的投递，但不无限等待（处理器内自我退订时工作者就是当前任务）
        let _ = time::timeout(UNSUBSCRIBE_WAIT, sub.finished()).await;
        Ok(())
    }

    fn topics(&self) -> Vec<String> {
        self.shared.read_registry().keys().cloned().collect()
    }

    fn subscriber_count(&self, topic: &str) -> usize {
        self.shared.read_registry().get(topic).map_or(0, Vec::len)
    }

    fn stats(&self) -> DeliveryStats {
        self.shared.counters.snapshot()
    }
}

impl Drop for MemoryEngine {
    fn drop(&mut self) {
        if let Some(runtime) = self.take_runtime() {
            runtime.token.cancel();
        }
    }
}

impl EngineShared {
    fn read_registry(&self) -> std::sync::RwLockReadGuard<'_, Registry> {
        self.registry.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_registry(&self) -> std::sync::RwLockWriteGuard<'_, Registry> {
        self.registry.write().unwrap_or_else(|e| e.into_inner())
    }

    fn insert(&self, sub: Arc<MemorySubscription>) {
        let created = {
            let mut registry = self.write_registry();
            let subs = registry.entry(sub.topic().to_string()).or_default();
            subs.push(sub.clone());
            subs.len() == 1
        };

        if created {
            self.notifier.emit(|| BusNotification::TopicCreated {
                engine: self.name.clone(),
                topic: sub.topic().to_string(),
            });
        }
        self.notifier.emit(|| BusNotification::SubscriptionCreated {
            engine: self.name.clone(),
            topic: sub.topic().to_string(),
            subscription: sub.id().to_string(),
            is_async: sub.is_async(),
        });
    }

    /// 从注册表移除订阅；主题变空时一并删除
    fn detach(&self, sub: &MemorySubscription) {
        let topic_deleted = {
            let mut registry = self.write_registry();
            let Some(subs) = registry.get_mut(sub.topic()) else {
                return;
            };
            let before = subs.len();
            subs.retain(|s| s.id() != sub.id());
            if subs.len() == before {
                return;
            }
            let empty = subs.is_empty();
            if empty {
                registry.remove(sub.topic());
            }
            empty
        };

        tracing::debug!(
            engine = %self.name,
            topic = sub.topic(),
            subscription = sub.id(),
            "subscription removed"
        );
        self.notify_removed(sub);
        if topic_deleted {
            self.notifier.emit(|| BusNotification::TopicDeleted {
                engine: self.name.clone(),
                topic: sub.topic().to_string(),
            });
        }
    }

    fn drain(&self) -> Registry {
        std::mem::take(&mut *self.write_registry())
    }

    /// 读锁下取匹配快照，锁在返回前释放
    fn matching(&self, topic: &str) -> Vec<Arc<MemorySubscription>> {
        self.read_registry()
            .iter()
            .filter(|(pattern, _)| topic::matches(pattern, topic))
            .flat_map(|(_, subs)| subs.iter())
            .filter(|sub| !sub.is_cancelled())
            .cloned()
            .collect()
    }

    fn notify_removed(&self, sub: &MemorySubscription) {
        self.notifier.emit(|| BusNotification::SubscriptionRemoved {
            engine: self.name.clone(),
            topic: sub.topic().to_string(),
            subscription: sub.id().to_string(),
        });
    }

    /// 调用处理器并在完成后计入 delivered；处理器错误只记录，不向外传播
    async fn deliver(&self, ctx: &BusContext, sub: &MemorySubscription, event: &Event) {
        let mut event = event.clone();
        event.mark_processing_started(Utc::now());
        let outcome = sub.handler().handle(ctx, &event).await;
        event.mark_processing_completed(Utc::now());
        self.counters.record_delivered();

        match outcome {
            Ok(()) => self.notifier.emit(|| BusNotification::MessageReceived {
                engine: self.name.clone(),
                subscription: sub.id().to_string(),
                event,
            }),
            Err(err) => {
                tracing::warn!(
                    engine = %self.name,
                    topic = event.topic(),
                    subscription = sub.id(),
                    error = %err,
                    "event handler failed"
                );
                self.notifier.emit(|| BusNotification::MessageFailed {
                    engine: self.name.clone(),
                    subscription: sub.id().to_string(),
                    topic: event.topic().to_string(),
                    reason: err.to_string(),
                });
            }
        }
    }

    fn record_drop(&self, sub: &MemorySubscription, topic: &str, reason: DropReason) {
        self.counters.record_dropped();
        tracing::debug!(
            engine = %self.name,
            topic,
            subscription = sub.id(),
            %reason,
            "event dropped"
        );
        self.notifier.emit(|| BusNotification::MessageDropped {
            engine: self.name.clone(),
            subscription: sub.id().to_string(),
            topic: topic.to_string(),
            reason,
        });
    }

    fn prune_history(&self) -> usize {
        let Some(cutoff) = TimeDelta::from_std(self.config.retention())
            .ok()
            .and_then(|retention| Utc::now().checked_sub_signed(retention))
        else {
            return 0;
        };
        let removed = self.history.prune_before(cutoff);
        if removed > 0 {
            tracing::debug!(engine = %self.name, removed, "pruned event history");
        }
        removed
    }
}
