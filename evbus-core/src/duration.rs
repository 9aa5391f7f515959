//! 时长的 serde 表示
//!
//! 配置中的时长既可以是整数（毫秒），也可以是带单位后缀的字符串：
//! `"250ms"`、`"30s"`、`"5m"`、`"24h"`、`"7d"`。序列化统一输出毫秒字符串。
//!
//! ```rust
//! use evbus_core::duration::parse_duration;
//! use std::time::Duration;
//!
//! assert_eq!(parse_duration("250ms"), Some(Duration::from_millis(250)));
//! assert_eq!(parse_duration("2h"), Some(Duration::from_secs(7200)));
//! assert_eq!(parse_duration("soon"), None);
//! ```
use serde::de::{self, Deserializer, Visitor};
use serde::ser::Serializer;
use std::fmt;
use std::time::Duration;

/// 解析带单位的时长字符串；纯数字按毫秒处理
pub fn parse_duration(input: &str) -> Option<Duration> {
    let s = input.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);
    let value: u64 = digits.parse().ok()?;

    let duration = match unit.trim() {
        "" | "ms" => Duration::from_millis(value),
        "s" => Duration::from_secs(value),
        "m" => Duration::from_secs(value.checked_mul(60)?),
        "h" => Duration::from_secs(value.checked_mul(3_600)?),
        "d" => Duration::from_secs(value.checked_mul(86_400)?),
        _ => return None,
    };
    Some(duration)
}

pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format!("{}ms", duration.as_millis()))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(DurationVisitor)
}

struct DurationVisitor;

impl Visitor<'_> for DurationVisitor {
    type Value = Duration;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("milliseconds or a duration string such as \"30s\"")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Duration, E> {
        Ok(Duration::from_millis(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Duration, E> {
        u64::try_from(v)
            .map(Duration::from_millis)
            .map_err(|_| E::custom(format!("negative duration: {v}")))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Duration, E> {
        parse_duration(v).ok_or_else(|| E::custom(format!("invalid duration: {v:?}")))
    }
}
