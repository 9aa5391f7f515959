//! 订阅（Subscription）
//!
//! 订阅对象只对创建它的引擎实例有效；引擎在 `unsubscribe` 时通过
//! `as_any` 还原具体类型并校验归属。
//!
use crate::error::BusResult;
use std::any::Any;
use std::fmt;

pub trait Subscription: Send + Sync + fmt::Debug {
    /// 引擎分配的唯一标识，在订阅生命周期内稳定
    fn id(&self) -> &str;

    /// 订阅的主题（精确主题或以 `*` 结尾的前缀通配）
    fn topic(&self) -> &str;

    /// 是否为异步订阅（处理器交给共享工作池执行）
    fn is_async(&self) -> bool;

    fn is_cancelled(&self) -> bool;

    /// 取消订阅：单调且幂等，重复调用直接返回成功
    fn cancel(&self) -> BusResult<()>;

    fn as_any(&self) -> &dyn Any;
}
