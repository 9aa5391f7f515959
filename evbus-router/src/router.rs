//! 引擎路由器（EngineRouter）
//!
//! 持有多个命名引擎，按路由规则为每个主题选择引擎：
//! - 规则按配置顺序匹配，规则内按模式顺序匹配，首个命中即返回；
//! - 未命中任何规则时回退到默认引擎；
//! - 命中的引擎名不在引擎表中时显式报错，而不是静默丢弃。
//!
use crate::config::{EventBusConfig, RoutingRule};
use crate::error::{RouterError, RouterResult};
use crate::registry::EngineRegistry;
use evbus_core::context::BusContext;
use evbus_core::event::Event;
use evbus_core::eventing::{
    DeliveryStats, EngineInit, EventEngine, EventHandler, NotificationSink, Subscription,
};
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// 按引擎划分的投递统计以及合计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RouterStats {
    pub engines: BTreeMap<String, DeliveryStats>,
    pub total: DeliveryStats,
}

pub struct EngineRouter {
    engines: HashMap<String, Arc<dyn EventEngine>>,
    // 配置顺序，用于启停与退订时的遍历
    order: Vec<String>,
    rules: Vec<RoutingRule>,
    default_engine: String,
}

impl EngineRouter {
    /// 使用进程级注册表构造，不注入通知出口
    pub fn new(config: &EventBusConfig) -> RouterResult<Self> {
        Self::with_registry(config, EngineRegistry::global(), None)
    }

    /// 为每个引擎描述实例化一个引擎；任一失败则整体失败
    pub fn with_registry(
        config: &EventBusConfig,
        registry: &EngineRegistry,
        sink: Option<Arc<dyn NotificationSink>>,
    ) -> RouterResult<Self> {
        config.validate()?;

        let mut engines = HashMap::new();
        let mut order = Vec::new();
        for desc in config.engine_configs() {
            let init = EngineInit::new(desc.name.clone(), desc.config).with_sink(sink.clone());
            let engine = registry.create(&desc.kind, init)?;
            tracing::debug!(engine = %desc.name, kind = %desc.kind, "engine created");
            order.push(desc.name.clone());
            engines.insert(desc.name, engine);
        }

        let default_engine = config
            .default_engine_name()
            .ok_or_else(|| RouterError::InvalidConfig("no engine configured".into()))?;

        tracing::info!(
            engines = ?order,
            rules = config.routing.len(),
            default = %default_engine,
            "engine router created"
        );
        Ok(Self {
            engines,
            order,
            rules: config.routing.clone(),
            default_engine,
        })
    }

    /// 主题对应的引擎名；纯函数，可用于诊断
    pub fn engine_for_topic(&self, topic: &str) -> &str {
        self.rules
            .iter()
            .find(|rule| rule.matches(topic))
            .map_or(self.default_engine.as_str(), |rule| rule.engine.as_str())
    }

    pub fn default_engine(&self) -> &str {
        &self.default_engine
    }

    pub fn engine_names(&self) -> &[String] {
        &self.order
    }

    pub fn engine(&self, name: &str) -> Option<Arc<dyn EventEngine>> {
        self.engines.get(name).cloned()
    }

    fn route(&self, topic: &str) -> RouterResult<&Arc<dyn EventEngine>> {
        let name = self.engine_for_topic(topic);
        self.engines
            .get(name)
            .ok_or_else(|| RouterError::EngineNotFound {
                topic: topic.to_string(),
                engine: name.to_string(),
            })
    }

    fn ordered(&self) -> impl Iterator<Item = &Arc<dyn EventEngine>> {
        self.order.iter().filter_map(|name| self.engines.get(name))
    }

    /// 按配置顺序启动全部引擎；遇到错误立即返回
    pub async fn start(&self, ctx: &BusContext) -> RouterResult<()> {
        for engine in self.ordered() {
            engine.start(ctx).await?;
        }
        tracing::info!(engines = self.order.len(), "engine router started");
        Ok(())
    }

    /// 并发停止全部引擎，等待所有引擎结束后返回第一个错误
    pub async fn stop(&self, ctx: &BusContext) -> RouterResult<()> {
        let results = join_all(self.ordered().map(|engine| async move {
            let result = engine.stop(ctx).await;
            if let Err(err) = &result {
                tracing::warn!(engine = %engine.name(), error = %err, "engine stop failed");
            }
            result
        }))
        .await;

        results.into_iter().collect::<Result<Vec<()>, _>>()?;
        tracing::info!("engine router stopped");
        Ok(())
    }

    pub async fn publish(&self, ctx: &BusContext, event: Event) -> RouterResult<()> {
        let engine = self.route(event.topic())?;
        engine.publish(ctx, event).await?;
        Ok(())
    }

    pub async fn subscribe(
        &self,
        ctx: &BusContext,
        topic: &str,
        handler: Arc<dyn EventHandler>,
    ) -> RouterResult<Arc<dyn Subscription>> {
        let engine = self.route(topic)?;
        Ok(engine.subscribe(ctx, topic, handler).await?)
    }

    pub async fn subscribe_async(
        &self,
        ctx: &BusContext,
        topic: &str,
        handler: Arc<dyn EventHandler>,
    ) -> RouterResult<Arc<dyn Subscription>> {
        let engine = self.route(topic)?;
        Ok(engine.subscribe_async(ctx, topic, handler).await?)
    }

    /// 依次尝试每个引擎，由签发该订阅的引擎完成退订
    pub async fn unsubscribe(
        &self,
        ctx: &BusContext,
        subscription: &dyn Subscription,
    ) -> RouterResult<()> {
        for engine in self.ordered() {
            match engine.unsubscribe(ctx, subscription).await {
                Ok(()) => return Ok(()),
                Err(err) if err.is_wrong_subscription() => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Err(RouterError::SubscriptionNotFound {
            id: subscription.id().to_string(),
        })
    }

    /// 全部引擎的主题并集（排序、去重）
    pub fn topics(&self) -> Vec<String> {
        self.ordered()
            .flat_map(|engine| engine.topics())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.ordered()
            .map(|engine| engine.subscriber_count(topic))
            .sum()
    }

    pub fn stats(&self) -> RouterStats {
        let engines: BTreeMap<String, DeliveryStats> = self
            .ordered()
            .map(|engine| (engine.name().to_string(), engine.stats()))
            .collect();
        let total = engines.values().copied().sum();
        RouterStats { engines, total }
    }
}
