use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::RwLock;

pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(24 * 60 * 60);
pub const MIN_COOLDOWN: Duration = Duration::from_secs(1);
/// 冷却时长上限（一年）。
pub const MAX_COOLDOWN: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// 单个后端的可用性。
///
/// `Disabled` 自带恢复时间，因此“禁用 ⇔ 有 disabled_until”在类型层面成立。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Enabled,
    Disabled { until: DateTime<Utc> },
}

impl Availability {
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled)
    }

    pub fn disabled_until(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Enabled => None,
            Self::Disabled { until } => Some(*until),
        }
    }
}

/// 对外展示的配额状态（/quota 与 429 响应体共用）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaStatus {
    pub available: bool,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "crate::util::time::serialize_opt"
    )]
    pub next_available: Option<DateTime<Utc>>,
}

impl From<Availability> for QuotaStatus {
    fn from(a: Availability) -> Self {
        Self {
            available: a.is_enabled(),
            next_available: a.disabled_until(),
        }
    }
}

impl QuotaStatus {
    pub const AVAILABLE: QuotaStatus = QuotaStatus {
        available: true,
        next_available: None,
    };
}

/// 一个后端模型的配额状态机：Enabled ⇄ Disabled(until)。
///
/// 所有读改写都在同一把写锁内完成，保证并发的 refresh 不会把
/// 刚被 disable 的状态重新启用。
#[derive(Debug)]
pub struct QuotaState {
    name: String,
    cooldown: TimeDelta,
    inner: RwLock<Availability>,
}

impl QuotaState {
    pub fn new(name: impl Into<String>, cooldown: Duration) -> Self {
        let name = name.into();
        // disabled_until 必须严格晚于触发时刻。
        let clamped = cooldown.clamp(MIN_COOLDOWN, MAX_COOLDOWN);
        if clamped != cooldown {
            tracing::warn!(
                backend = %name,
                "冷却时长 {}s 超出范围，按 {}s 处理",
                cooldown.as_secs_f64(),
                clamped.as_secs()
            );
        }
        let cooldown = TimeDelta::from_std(clamped).unwrap_or(TimeDelta::days(365));
        Self {
            name,
            cooldown,
            inner: RwLock::new(Availability::Enabled),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cooldown(&self) -> TimeDelta {
        self.cooldown
    }

    /// 冷却到期则恢复可用；否则不做任何改动。
    pub async fn refresh(&self) {
        self.refresh_at(Utc::now()).await;
    }

    pub async fn refresh_at(&self, now: DateTime<Utc>) {
        let mut inner = self.inner.write().await;
        self.apply_refresh(&mut inner, now);
    }

    /// 无条件进入冷却，窗口从现在重新计算（已处于冷却时也会延长）。
    pub async fn disable(&self) -> DateTime<Utc> {
        self.disable_at(Utc::now()).await
    }

    pub async fn disable_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let until = now
            .checked_add_signed(self.cooldown)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let mut inner = self.inner.write().await;
        *inner = Availability::Disabled { until };
        tracing::warn!(
            backend = %self.name,
            "模型配额耗尽，停用至 {}",
            crate::util::time::format_rfc3339(until)
        );
        until
    }

    /// 只读快照，不触发 refresh。
    pub async fn status(&self) -> QuotaStatus {
        QuotaStatus::from(*self.inner.read().await)
    }

    /// refresh + status 的原子组合：分发前使用。
    pub async fn check(&self) -> QuotaStatus {
        self.check_at(Utc::now()).await
    }

    pub async fn check_at(&self, now: DateTime<Utc>) -> QuotaStatus {
        let mut inner = self.inner.write().await;
        self.apply_refresh(&mut inner, now);
        QuotaStatus::from(*inner)
    }

    fn apply_refresh(&self, inner: &mut Availability, now: DateTime<Utc>) {
        if let Availability::Disabled { until } = *inner
            && now >= until
        {
            *inner = Availability::Enabled;
            tracing::info!(backend = %self.name, "冷却期结束，模型已恢复可用");
        }
    }
}
