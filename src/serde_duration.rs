//! 人性化时间间隔的 serde 适配
//!
//! 支持 "5s"、"100ms"、"1m30s" 这类写法，用于 source 和探测器的配置

use anyhow::{anyhow, Result};
use serde::{Deserialize, Deserializer, Serializer};
use std::time::Duration;

pub use serde_with::{serde_as, DeserializeAs, SerializeAs};

/// `Duration` 字段的适配器，配合 `#[serde_as(as = "HumanDur")]` 使用
pub struct HumanDur;

impl SerializeAs<Duration> for HumanDur {
    fn serialize_as<S>(source: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format_duration(*source))
    }
}

impl<'de> DeserializeAs<'de, Duration> for HumanDur {
    fn deserialize_as<D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

const UNITS: [(&str, u64); 6] = [
    ("ms", 1_000_000),
    ("us", 1_000),
    ("ns", 1),
    ("s", 1_000_000_000),
    ("m", 60 * 1_000_000_000),
    ("h", 3600 * 1_000_000_000),
];

/// 解析整数 + 单位的组合，如 "1m30s" -> 90s
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim().to_lowercase();
    if s.is_empty() {
        return Err(anyhow!("empty duration"));
    }

    let mut rest = s.as_str();
    let mut total_nanos: u64 = 0;
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if digits == 0 {
            return Err(anyhow!("expected a number in duration {:?}", s));
        }
        let value: u64 = rest[..digits].parse()?;
        rest = &rest[digits..];

        let (unit, scale) = UNITS
            .iter()
            .find(|(unit, _)| rest.starts_with(unit))
            .ok_or_else(|| anyhow!("missing or unknown unit in duration {:?}", s))?;
        rest = &rest[unit.len()..];

        let nanos = value
            .checked_mul(*scale)
            .and_then(|n| total_nanos.checked_add(n))
            .ok_or_else(|| anyhow!("duration {:?} overflows", s))?;
        total_nanos = nanos;
    }

    Ok(Duration::from_nanos(total_nanos))
}

/// 格式化为最简的组合写法，如 90s -> "1m30s"
pub fn format_duration(duration: Duration) -> String {
    let mut nanos = duration.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }

    let mut out = String::new();
    for (unit, scale) in [
        ("h", 3600 * 1_000_000_000u128),
        ("m", 60 * 1_000_000_000),
        ("s", 1_000_000_000),
        ("ms", 1_000_000),
        ("us", 1_000),
        ("ns", 1),
    ] {
        if nanos >= scale {
            out.push_str(&format!("{}{}", nanos / scale, unit));
            nanos %= scale;
        }
    }
    out
}
