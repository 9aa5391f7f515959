//! 事件子系统（eventing）
//!
//! 定义所有投递引擎共享的协议与构件：
//! - `EventEngine`：生命周期、发布、订阅/退订与自省；
//! - `EventHandler`：订阅方的处理逻辑；
//! - `Subscription`：引擎签发的订阅句柄；
//! - `NotificationSink`：可选的生命周期/投递通知出口；
//! - `DeliveryStats`：投递与丢弃计数；
//! - `topic`：精确与后缀通配的主题匹配。
//!
//! 该模块不绑定具体实现，内存引擎见 `crate::memory`。
//!
pub mod engine;
pub mod handler;
pub mod notification;
pub mod stats;
pub mod subscription;
pub mod topic;

pub use engine::{EngineInit, EngineSettings, EventEngine};
pub use handler::{EventHandler, FnHandler, handler_fn};
pub use notification::{BusNotification, DropReason, NotificationSink, Notifier};
pub use stats::{DeliveryCounters, DeliveryStats};
pub use subscription::Subscription;
