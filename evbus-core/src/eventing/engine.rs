//! 投递引擎（EventEngine）协议
//!
//! 每一种引擎（内存实现或外部 broker 适配器）都需要提供的能力集合：
//! - 生命周期：`start`/`stop` 均幂等；
//! - 发布与订阅（同步/异步），未启动时返回 `NotStarted`；
//! - 退订：只接受本引擎创建的订阅，否则返回 `WrongSubscriptionType`；
//! - 主题自省与投递统计。
//!
use super::handler::EventHandler;
use super::notification::NotificationSink;
use super::stats::DeliveryStats;
use super::subscription::Subscription;
use crate::context::BusContext;
use crate::error::BusResult as Result;
use crate::event::Event;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

/// 引擎私有的自由格式配置，仅由对应引擎的构造函数解释
pub type EngineSettings = Map<String, Value>;

#[async_trait]
pub trait EventEngine: Send + Sync {
    /// 引擎实例名称（路由器中的唯一名）
    fn name(&self) -> &str;

    /// 启动引擎；已启动时为无副作用的成功
    async fn start(&self, ctx: &BusContext) -> Result<()>;

    /// 停止引擎：取消全部订阅并在限定时间内等待在途处理结束
    async fn stop(&self, ctx: &BusContext) -> Result<()>;

    /// 发布事件；没有匹配的订阅不是错误
    async fn publish(&self, ctx: &BusContext, event: Event) -> Result<()>;

    /// 同步订阅：处理器在订阅自身的投递工作者上执行
    async fn subscribe(
        &self,
        ctx: &BusContext,
        topic: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<Arc<dyn Subscription>>;

    /// 异步订阅：处理器交给引擎的共享工作池执行
    async fn subscribe_async(
        &self,
        ctx: &BusContext,
        topic: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<Arc<dyn Subscription>>;

    async fn unsubscribe(&self, ctx: &BusContext, subscription: &dyn Subscription) -> Result<()>;

    /// 当前至少有一个存活订阅的主题
    fn topics(&self) -> Vec<String>;

    /// 精确匹配的订阅数量（不展开通配）
    fn subscriber_count(&self, topic: &str) -> usize;

    /// 投递统计；不做统计的适配器返回零值
    fn stats(&self) -> DeliveryStats {
        DeliveryStats::default()
    }
}

/// 工厂构造引擎时的输入
#[derive(Clone, Default)]
pub struct EngineInit {
    pub name: String,
    pub settings: EngineSettings,
    pub sink: Option<Arc<dyn NotificationSink>>,
}

impl EngineInit {
    pub fn new(name: impl Into<String>, settings: EngineSettings) -> Self {
        Self {
            name: name.into(),
            settings,
            sink: None,
        }
    }

    pub fn with_sink(mut self, sink: Option<Arc<dyn NotificationSink>>) -> Self {
        self.sink = sink;
        self
    }
}
