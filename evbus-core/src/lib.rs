//! 进程内事件总线核心库（evbus-core）
//!
//! 定义总线各层共享的模型与协议，并提供内存投递引擎：
//! - 事件（`event`）与调用上下文（`context`）
//! - 引擎协议、处理器、订阅与主题匹配（`eventing`）
//! - 生命周期通知与投递统计（`eventing::notification`、`eventing::stats`）
//! - 内存引擎（`memory`，默认 feature）：有界队列、三种准入策略、异步工作池与历史保留
//!
//! 路由与工厂注册表位于 `evbus-router`，本 crate 不依赖它。
//!
//! 典型用法：
//! 1. 用 `MemoryEngine::new` 或 `MemoryEngine::from_init` 创建引擎并 `start`；
//! 2. 以 `handler_fn` 或自定义 `EventHandler` 订阅主题（支持 `prefix*` 通配）；
//! 3. `publish` 事件，通过 `stats` 观察 delivered/dropped；
//! 4. `stop` 在关闭超时内等待工作者退出。
//!
pub mod context;
pub mod duration;
pub mod error;
pub mod event;
pub mod eventing;
#[cfg(feature = "memory")]
pub mod memory;
