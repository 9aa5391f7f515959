//! 总线配置
//!
//! 支持两种形态：
//! - 旧版单引擎：`{ "engine": "memory", "workerCount": 5, ... }`，其余键整体透传给引擎；
//! - 多引擎：`{ "engines": [{ "name", "type", "config" }], "routing": [{ "topics", "engine" }] }`。
//!
use crate::error::{RouterError, RouterResult};
use evbus_core::eventing::EngineSettings;
use evbus_core::eventing::topic;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

/// 旧版单引擎配置生成的引擎名
pub const LEGACY_ENGINE_NAME: &str = "default";

fn default_engine_kind() -> String {
    evbus_core::memory::ENGINE_KIND.to_string()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventBusConfig {
    /// 旧版单引擎的引擎类型
    #[serde(default = "default_engine_kind")]
    pub engine: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub engines: Vec<EngineConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routing: Vec<RoutingRule>,
    /// 未命中任何路由规则时的引擎；缺省为第一个引擎
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_engine: Option<String>,
    /// 旧版单引擎的其余键
    #[serde(flatten)]
    pub settings: EngineSettings,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            engine: default_engine_kind(),
            engines: Vec::new(),
            routing: Vec::new(),
            default_engine: None,
            settings: EngineSettings::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub config: EngineSettings,
}

impl EngineConfig {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            config: EngineSettings::new(),
        }
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }
}

/// 按顺序匹配的路由规则：命中任一模式即交给 `engine`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoutingRule {
    pub topics: Vec<String>,
    pub engine: String,
}

impl RoutingRule {
    pub fn new<I, S>(topics: I, engine: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            topics: topics.into_iter().map(Into::into).collect(),
            engine: engine.into(),
        }
    }

    pub fn matches(&self, topic_name: &str) -> bool {
        self.topics.iter().any(|p| topic::matches(p, topic_name))
    }
}

impl EventBusConfig {
    /// 旧版单引擎配置
    pub fn legacy(kind: impl Into<String>, settings: EngineSettings) -> Self {
        Self {
            engine: kind.into(),
            settings,
            ..Default::default()
        }
    }

    pub fn from_value(value: Value) -> RouterResult<Self> {
        serde_json::from_value(value).map_err(|e| RouterError::InvalidConfig(e.to_string()))
    }

    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engines.push(engine);
        self
    }

    pub fn with_route(mut self, rule: RoutingRule) -> Self {
        self.routing.push(rule);
        self
    }

    pub fn with_default_engine(mut self, name: impl Into<String>) -> Self {
        self.default_engine = Some(name.into());
        self
    }

    pub fn is_multi_engine(&self) -> bool {
        !self.engines.is_empty()
    }

    /// 待实例化的引擎列表；旧版配置只产生一个名为 `default` 的引擎
    pub fn engine_configs(&self) -> Vec<EngineConfig> {
        if self.is_multi_engine() {
            return self.engines.clone();
        }
        vec![EngineConfig {
            name: LEGACY_ENGINE_NAME.to_string(),
            kind: self.engine.clone(),
            config: self.settings.clone(),
        }]
    }

    pub fn default_engine_name(&self) -> Option<String> {
        if let Some(name) = &self.default_engine {
            return Some(name.clone());
        }
        self.engine_configs().into_iter().next().map(|e| e.name)
    }

    /// 校验引擎列表与默认引擎；不检查路由目标
    pub fn validate(&self) -> RouterResult<()> {
        let engines = self.engine_configs();
        let mut names = HashSet::new();
        for engine in &engines {
            if engine.name.trim().is_empty() {
                return Err(RouterError::InvalidConfig("engine name must not be empty".into()));
            }
            if engine.kind.trim().is_empty() {
                return Err(RouterError::InvalidConfig(format!(
                    "engine type must not be empty: engine={}",
                    engine.name
                )));
            }
            if !names.insert(engine.name.as_str()) {
                return Err(RouterError::InvalidConfig(format!(
                    "duplicate engine name: {}",
                    engine.name
                )));
            }
        }
        match &self.default_engine {
            Some(default) if !names.contains(default.as_str()) => {
                Err(RouterError::InvalidConfig(format!(
                    "default engine is not configured: {default}"
                )))
            }
            _ => Ok(()),
        }
    }

    /// 校验路由规则：模式非空，目标引擎已配置
    pub fn validate_routing(&self) -> RouterResult<()> {
        let engines = self.engine_configs();
        for (idx, rule) in self.routing.iter().enumerate() {
            if rule.topics.is_empty() || rule.topics.iter().any(|t| t.trim().is_empty()) {
                return Err(RouterError::InvalidConfig(format!(
                    "routing rule #{idx} has an empty topic pattern"
                )));
            }
            if !engines.iter().any(|e| e.name == rule.engine) {
                return Err(RouterError::InvalidConfig(format!(
                    "routing rule #{idx} targets unknown engine: {}",
                    rule.engine
                )));
            }
        }
        Ok(())
    }
}
