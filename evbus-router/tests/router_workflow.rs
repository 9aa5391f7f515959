use anyhow::Result as AnyResult;
use async_trait::async_trait;
use evbus_core::context::BusContext;
use evbus_core::error::{BusError, BusResult};
use evbus_core::event::Event;
use evbus_core::eventing::{
    BusNotification, EngineInit, EventEngine, EventHandler, NotificationSink, Subscription,
    handler_fn,
};
use evbus_router::{
    EngineConfig, EngineRegistry, EngineRouter, EventBusConfig, RouterError, RoutingRule,
    register_engine,
};
use serde_json::{Value, json};
use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

async fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    tokio::time::timeout(Duration::from_secs(3), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .is_ok()
}

fn recorder(into: Arc<Mutex<Vec<Value>>>) -> Arc<dyn EventHandler> {
    handler_fn(move |_ctx, event| {
        let into = into.clone();
        async move {
            into.lock().unwrap().push(event.payload().clone());
            Ok(())
        }
    })
}

fn two_memory_engines() -> EventBusConfig {
    EventBusConfig::default()
        .with_engine(EngineConfig::new("A", "memory"))
        .with_engine(EngineConfig::new("B", "memory").with_setting("workerCount", 2))
        .with_route(RoutingRule::new(["a.*"], "A"))
        .with_route(RoutingRule::new(["b.*"], "B"))
        .with_default_engine("B")
}

#[tokio::test(flavor = "multi_thread")]
async fn two_engines_split_traffic_by_topic() -> AnyResult<()> {
    let router = EngineRouter::new(&two_memory_engines())?;
    let ctx = BusContext::default();
    router.start(&ctx).await?;

    let on_a = Arc::new(Mutex::new(Vec::new()));
    let on_b = Arc::new(Mutex::new(Vec::new()));
    router.subscribe(&ctx, "a.one", recorder(on_a.clone())).await?;
    router.subscribe(&ctx, "b.two", recorder(on_b.clone())).await?;

    router.publish(&ctx, Event::new("a.one", json!(1))).await?;
    router.publish(&ctx, Event::new("b.two", json!(2))).await?;
    router.publish(&ctx, Event::new("a.one", json!(3))).await?;

    assert!(eventually(|| on_a.lock().unwrap().len() == 2 && on_b.lock().unwrap().len() == 1).await);
    assert_eq!(*on_a.lock().unwrap(), vec![json!(1), json!(3)]);
    assert_eq!(*on_b.lock().unwrap(), vec![json!(2)]);

    assert!(eventually(|| router.stats().total.delivered >= 3).await);
    let stats = router.stats();
    assert_eq!(stats.engines["A"].delivered, 2);
    assert_eq!(stats.engines["B"].delivered, 1);
    assert_eq!(router.engine_for_topic("c.anything"), "B");

    router.stop(&ctx).await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn topics_and_counts_aggregate_across_engines() -> AnyResult<()> {
    let router = EngineRouter::new(&two_memory_engines())?;
    let ctx = BusContext::default();
    router.start(&ctx).await?;

    let sink = Arc::new(Mutex::new(Vec::new()));
    let sub_a = router.subscribe(&ctx, "a.x", recorder(sink.clone())).await?;
    let sub_b = router
        .subscribe_async(&ctx, "b.y", recorder(sink.clone()))
        .await?;

    assert_eq!(router.topics(), vec!["a.x".to_string(), "b.y".to_string()]);
    assert_eq!(router.subscriber_count("a.x"), 1);
    assert_eq!(router.subscriber_count("b.y"), 1);
    assert_eq!(router.subscriber_count("c.z"), 0);

    router.publish(&ctx, Event::new("a.x", json!("a"))).await?;
    router.publish(&ctx, Event::new("b.y", json!("b"))).await?;
    assert!(eventually(|| router.stats().total.delivered >= 2).await);

    router.unsubscribe(&ctx, sub_a.as_ref()).await?;
    router.unsubscribe(&ctx, sub_b.as_ref()).await?;
    assert!(router.topics().is_empty());

    router.stop(&ctx).await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn route_to_missing_engine_fails_loudly() -> AnyResult<()> {
    let config = EventBusConfig::default()
        .with_engine(EngineConfig::new("A", "memory"))
        .with_route(RoutingRule::new(["audit.*"], "typo"));
    let router = EngineRouter::new(&config)?;
    let ctx = BusContext::default();
    router.start(&ctx).await?;

    let err = router
        .publish(&ctx, Event::new("audit.login", json!(null)))
        .await
        .unwrap_err();
    assert!(
        matches!(err, RouterError::EngineNotFound { ref topic, ref engine } if topic == "audit.login" && engine == "typo")
    );

    let err = router
        .subscribe(&ctx, "audit.*", recorder(Arc::default()))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, RouterError::EngineNotFound { .. }));

    // 未命中规则的主题仍由默认引擎处理
    router.publish(&ctx, Event::new("other", json!(1))).await?;

    router.stop(&ctx).await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn operations_before_start_surface_engine_errors() -> AnyResult<()> {
    let router = EngineRouter::new(&EventBusConfig::default())?;
    let ctx = BusContext::default();

    let err = router
        .publish(&ctx, Event::new("t", json!(1)))
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::Bus(BusError::NotStarted { .. })));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn legacy_document_drives_single_engine() -> AnyResult<()> {
    let config = EventBusConfig::from_value(json!({
        "engine": "memory",
        "maxEventQueueSize": 16,
        "defaultEventBufferSize": 4,
        "workerCount": 1,
        "eventTTL": "10m",
        "retentionDays": 1
    }))?;
    let router = EngineRouter::new(&config)?;
    let ctx = BusContext::default();
    router.start(&ctx).await?;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sub = router.subscribe(&ctx, "legacy.*", recorder(seen.clone())).await?;
    router.publish(&ctx, Event::new("legacy.ping", json!("pong"))).await?;
    assert!(eventually(|| seen.lock().unwrap().len() == 1).await);

    router.unsubscribe(&ctx, sub.as_ref()).await?;
    router.stop(&ctx).await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_engine_type_aborts_construction() {
    let config = EventBusConfig::default()
        .with_engine(EngineConfig::new("A", "memory"))
        .with_engine(EngineConfig::new("B", "nats"));
    let err = EngineRouter::new(&config).err().unwrap();
    assert!(matches!(err, RouterError::UnknownEngineType(ref k) if k == "nats"));
}

// --- 测试替身：只记录调用的引擎 ---

#[derive(Debug)]
struct StubSubscription {
    id: String,
    topic: String,
    owner: String,
    cancelled: AtomicBool,
}

impl Subscription for StubSubscription {
    fn id(&self) -> &str {
        &self.id
    }
    fn topic(&self) -> &str {
        &self.topic
    }
    fn is_async(&self) -> bool {
        false
    }
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
    fn cancel(&self) -> BusResult<()> {
        self.cancelled.store(true, Ordering::SeqCst);
        Ok(())
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct StubEngine {
    name: String,
    published: Mutex<Vec<Event>>,
    sink: Option<Arc<dyn NotificationSink>>,
    next_id: AtomicUsize,
}

impl StubEngine {
    fn from_init(init: EngineInit) -> Self {
        Self {
            name: init.name,
            published: Mutex::default(),
            sink: init.sink,
            next_id: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl EventEngine for StubEngine {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self, _ctx: &BusContext) -> BusResult<()> {
        if let Some(sink) = &self.sink {
            let _ = sink.append(BusNotification::EngineStarted {
                engine: self.name.clone(),
            });
        }
        Ok(())
    }

    async fn stop(&self, _ctx: &BusContext) -> BusResult<()> {
        Ok(())
    }

    async fn publish(&self, _ctx: &BusContext, event: Event) -> BusResult<()> {
        self.published.lock().unwrap().push(event);
        Ok(())
    }

    async fn subscribe(
        &self,
        _ctx: &BusContext,
        topic: &str,
        _handler: Arc<dyn EventHandler>,
    ) -> BusResult<Arc<dyn Subscription>> {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(StubSubscription {
            id: format!("{}-{n}", self.name),
            topic: topic.to_string(),
            owner: self.name.clone(),
            cancelled: AtomicBool::new(false),
        }))
    }

    async fn subscribe_async(
        &self,
        ctx: &BusContext,
        topic: &str,
        handler: Arc<dyn EventHandler>,
    ) -> BusResult<Arc<dyn Subscription>> {
        self.subscribe(ctx, topic, handler).await
    }

    async fn unsubscribe(&self, _ctx: &BusContext, subscription: &dyn Subscription) -> BusResult<()> {
        match subscription.as_any().downcast_ref::<StubSubscription>() {
            Some(sub) if sub.owner == self.name => sub.cancel(),
            _ => Err(BusError::WrongSubscriptionType {
                engine: self.name.clone(),
                subscription: subscription.id().to_string(),
            }),
        }
    }

    fn topics(&self) -> Vec<String> {
        Vec::new()
    }

    fn subscriber_count(&self, _topic: &str) -> usize {
        0
    }
}

#[derive(Default)]
struct CountingSink {
    started: AtomicUsize,
}

impl NotificationSink for CountingSink {
    fn append(&self, notification: BusNotification) -> AnyResult<()> {
        if matches!(notification, BusNotification::EngineStarted { .. }) {
            self.started.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn custom_engine_kind_mixes_with_memory() -> AnyResult<()> {
    let registry = EngineRegistry::with_builtins();
    let stubs: Arc<Mutex<Vec<Arc<StubEngine>>>> = Arc::default();
    {
        let stubs = stubs.clone();
        registry.register("stub", move |init: EngineInit| -> BusResult<Arc<dyn EventEngine>> {
            let engine = Arc::new(StubEngine::from_init(init));
            stubs.lock().unwrap().push(engine.clone());
            Ok(engine as Arc<dyn EventEngine>)
        })?;
    }

    let config = EventBusConfig::default()
        .with_engine(EngineConfig::new("mem", "memory"))
        .with_engine(EngineConfig::new("remote", "stub"))
        .with_route(RoutingRule::new(["remote.*"], "remote"));
    let sink = Arc::new(CountingSink::default());
    let erased: Arc<dyn NotificationSink> = sink.clone();
    let router = EngineRouter::with_registry(&config, &registry, Some(erased))?;
    let ctx = BusContext::default();
    router.start(&ctx).await?;
    assert_eq!(sink.started.load(Ordering::SeqCst), 2);

    router
        .publish(&ctx, Event::new("remote.order", json!({"id": 7})))
        .await?;
    let stub = stubs.lock().unwrap()[0].clone();
    let published = stub.published.lock().unwrap().clone();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].topic(), "remote.order");

    // 退订由签发订阅的引擎完成，其他引擎拒绝
    let sub = router
        .subscribe(&ctx, "remote.order", recorder(Arc::default()))
        .await?;
    router.unsubscribe(&ctx, sub.as_ref()).await?;
    assert!(sub.is_cancelled());

    let foreign = StubSubscription {
        id: "elsewhere-1".into(),
        topic: "remote.order".into(),
        owner: "elsewhere".into(),
        cancelled: AtomicBool::new(false),
    };
    let err = router.unsubscribe(&ctx, &foreign).await.unwrap_err();
    assert!(matches!(err, RouterError::SubscriptionNotFound { ref id } if id == "elsewhere-1"));

    // 替身不统计投递，默认返回零
    assert_eq!(router.stats().engines["remote"].total(), 0);

    router.stop(&ctx).await?;
    Ok(())
}

#[test]
fn global_registration_is_unique_per_kind() {
    let factory = |init: EngineInit| -> BusResult<Arc<dyn EventEngine>> {
        Ok(Arc::new(StubEngine::from_init(init)))
    };
    register_engine("router-workflow-stub", factory).unwrap();
    let err = register_engine("router-workflow-stub", factory).unwrap_err();
    assert!(matches!(err, RouterError::AlreadyRegistered(_)));
    assert!(EngineRegistry::global().contains("router-workflow-stub"));
}

#[tokio::test(flavor = "multi_thread")]
async fn repeated_unsubscribe_is_accepted_by_owning_engine() -> AnyResult<()> {
    let router = EngineRouter::new(&two_memory_engines())?;
    let ctx = BusContext::default();
    router.start(&ctx).await?;

    let sub = router.subscribe(&ctx, "b.once", recorder(Arc::default())).await?;
    router.unsubscribe(&ctx, sub.as_ref()).await?;
    router.unsubscribe(&ctx, sub.as_ref()).await?;

    assert!(sub.is_cancelled());
    assert_eq!(router.subscriber_count("b.once"), 0);
    assert!(router.topics().is_empty());

    router.stop(&ctx).await?;
    Ok(())
}
