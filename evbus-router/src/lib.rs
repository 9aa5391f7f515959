//! 事件总线路由层（evbus-router）
//!
//! 在 `evbus-core` 的引擎协议之上提供：
//! - 总线配置（`config`）：旧版单引擎与多引擎两种形态；
//! - 引擎工厂注册表（`registry`）：进程级类型名 → 构造函数表，预置内存引擎；
//! - 引擎路由器（`router`）：按主题规则选择引擎，并聚合主题、订阅数与统计。
//!
pub mod config;
pub mod error;
pub mod registry;
pub mod router;

pub use config::{EngineConfig, EventBusConfig, RoutingRule};
pub use error::{RouterError, RouterResult};
pub use registry::{EngineFactory, EngineRegistry, register_engine};
pub use router::{EngineRouter, RouterStats};
