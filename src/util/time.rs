//! 对外时间戳：统一按配置的 UTC 偏移输出 RFC 3339（默认 +05:30）。

use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::Serializer;
use std::sync::OnceLock;

pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = 330;

static LOCAL_OFFSET: OnceLock<FixedOffset> = OnceLock::new();

/// 在 main 中调用一次；重复调用会被忽略。
pub fn init(offset_minutes: i32) {
    let offset = FixedOffset::east_opt(offset_minutes.saturating_mul(60))
        .unwrap_or_else(default_offset);
    let _ = LOCAL_OFFSET.set(offset);
}

fn default_offset() -> FixedOffset {
    FixedOffset::east_opt(DEFAULT_UTC_OFFSET_MINUTES * 60).unwrap_or_else(|| Utc.fix())
}

pub fn local_offset() -> FixedOffset {
    *LOCAL_OFFSET.get_or_init(default_offset)
}

pub fn to_local(dt: DateTime<Utc>) -> DateTime<FixedOffset> {
    dt.with_timezone(&local_offset())
}

pub fn format_rfc3339(dt: DateTime<Utc>) -> String {
    to_local(dt).to_rfc3339()
}

pub fn now_rfc3339() -> String {
    format_rfc3339(Utc::now())
}

/// serde 辅助：`Option<DateTime<Utc>>` 按本地偏移输出。
pub fn serialize_opt<S>(v: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match v {
        Some(dt) => serializer.serialize_str(&format_rfc3339(*dt)),
        None => serializer.serialize_none(),
    }
}
