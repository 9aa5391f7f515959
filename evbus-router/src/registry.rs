use crate::error::{RouterError, RouterResult};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use evbus_core::error::BusResult;
use evbus_core::eventing::{EngineInit, EventEngine};
use evbus_core::memory::{ENGINE_KIND as MEMORY_KIND, MemoryEngine};
use std::sync::{Arc, LazyLock};

/// 引擎构造函数：接收实例名、私有配置与通知出口，返回尚未启动的引擎
pub type EngineFactory = Arc<dyn Fn(EngineInit) -> BusResult<Arc<dyn EventEngine>> + Send + Sync>;

static GLOBAL: LazyLock<EngineRegistry> = LazyLock::new(EngineRegistry::with_builtins);

/// 引擎类型名 → 构造函数
/// - 进程级实例通过 `global()` 获取，启动时预置内置类型
/// - 运行期可注册新类型（外部 broker 适配器、测试替身等），同名注册会被拒绝
pub struct EngineRegistry {
    factories: DashMap<String, EngineFactory>,
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self {
            factories: DashMap::new(),
        }
    }
}

impl EngineRegistry {
    /// 空注册表，不含任何内置类型
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置内存引擎的注册表
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.factories.insert(
            MEMORY_KIND.to_string(),
            Arc::new(|init: EngineInit| -> BusResult<Arc<dyn EventEngine>> {
                Ok(Arc::new(MemoryEngine::from_init(init)?))
            }),
        );
        registry
    }

    pub fn global() -> &'static EngineRegistry {
        &GLOBAL
    }

    /// 注册引擎类型
    pub fn register<F>(&self, kind: impl Into<String>, factory: F) -> RouterResult<()>
    where
        F: Fn(EngineInit) -> BusResult<Arc<dyn EventEngine>> + Send + Sync + 'static,
    {
        let kind = kind.into();
        match self.factories.entry(kind) {
            Entry::Occupied(e) => Err(RouterError::AlreadyRegistered(e.key().clone())),
            Entry::Vacant(e) => {
                tracing::debug!(kind = %e.key(), "engine type registered");
                e.insert(Arc::new(factory));
                Ok(())
            }
        }
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// 按类型名构造引擎
    pub fn create(&self, kind: &str, init: EngineInit) -> RouterResult<Arc<dyn EventEngine>> {
        // 先克隆出构造函数，避免在持有分片锁时执行用户代码
        let Some(factory) = self.factories.get(kind).map(|f| f.clone()) else {
            return Err(RouterError::UnknownEngineType(kind.to_string()));
        };
        Ok((factory)(init)?)
    }

    /// 已注册的类型名（排序后）
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.factories.iter().map(|e| e.key().clone()).collect();
        kinds.sort();
        kinds
    }
}

/// 向进程级注册表注册引擎类型
pub fn register_engine<F>(kind: impl Into<String>, factory: F) -> RouterResult<()>
where
    F: Fn(EngineInit) -> BusResult<Arc<dyn EventEngine>> + Send + Sync + 'static,
{
    EngineRegistry::global().register(kind, factory)
}
