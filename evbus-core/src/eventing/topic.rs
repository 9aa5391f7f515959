//! 主题匹配
//!
//! 订阅模式要么与主题完全相等，要么以 [`WILDCARD`] 结尾并以其前缀匹配主题。
//! 引擎与路由器共用同一套语义。

/// 通配符标记，仅允许出现在模式末尾
pub const WILDCARD: char = '*';

pub fn matches(pattern: &str, topic: &str) -> bool {
    if pattern == topic {
        return true;
    }
    match pattern.strip_suffix(WILDCARD) {
        Some(prefix) => topic.starts_with(prefix),
        None => false,
    }
}
