use serde::{Deserialize, Serialize};
use std::iter::Sum;
use std::ops::Add;
use std::sync::atomic::{AtomicU64, Ordering};

/// 投递统计快照
///
/// - `delivered`：处理器实际执行完成（成功或失败）的次数；
/// - `dropped`：因队列满、等待超时/取消、工作池饱和或过期而放弃的次数。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryStats {
    pub delivered: u64,
    pub dropped: u64,
}

impl DeliveryStats {
    pub fn total(&self) -> u64 {
        self.delivered + self.dropped
    }
}

impl Add for DeliveryStats {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            delivered: self.delivered + rhs.delivered,
            dropped: self.dropped + rhs.dropped,
        }
    }
}

impl Sum for DeliveryStats {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

/// 无锁投递计数器，只增不减
#[derive(Debug, Default)]
pub struct DeliveryCounters {
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl DeliveryCounters {
    pub fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DeliveryStats {
        DeliveryStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}
