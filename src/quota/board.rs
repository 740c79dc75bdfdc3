use crate::dispatch::Mode;
use crate::quota::state::{QuotaState, QuotaStatus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// 未配置 thinking 模型时，/quota 如何展示 thinking 的状态。
///
/// - available：始终显示可用（请求会回退到 primary）
/// - primary：直接镜像 primary 的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnconfiguredThinkingStatus {
    #[default]
    Available,
    Primary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaSnapshot {
    pub thinking: QuotaStatus,
    pub primary: QuotaStatus,
}

/// 各后端配额状态的持有者，启动时创建一次，注入 Dispatcher 与 HTTP 层共享。
#[derive(Debug)]
pub struct QuotaBoard {
    primary: Arc<QuotaState>,
    thinking: Option<Arc<QuotaState>>,
    unconfigured_thinking: UnconfiguredThinkingStatus,
}

impl QuotaBoard {
    pub fn new(
        cooldown: Duration,
        thinking_configured: bool,
        unconfigured_thinking: UnconfiguredThinkingStatus,
    ) -> Self {
        let thinking = thinking_configured
            .then(|| Arc::new(QuotaState::new(Mode::Thinking.as_str(), cooldown)));
        Self {
            primary: Arc::new(QuotaState::new(Mode::Primary.as_str(), cooldown)),
            thinking,
            unconfigured_thinking,
        }
    }

    pub fn primary(&self) -> &Arc<QuotaState> {
        &self.primary
    }

    pub fn thinking(&self) -> Option<&Arc<QuotaState>> {
        self.thinking.as_ref()
    }

    /// 返回该模式对应的状态机；thinking 未配置时为 None。
    pub fn state_for(&self, mode: Mode) -> Option<&Arc<QuotaState>> {
        match mode {
            Mode::Primary => Some(&self.primary),
            Mode::Thinking => self.thinking.as_ref(),
        }
    }

    /// 先对每个后端做一次惰性恢复，再汇总状态。
    pub async fn snapshot(&self) -> QuotaSnapshot {
        let primary = self.primary.check().await;
        let thinking = match &self.thinking {
            Some(state) => state.check().await,
            None => match self.unconfigured_thinking {
                UnconfiguredThinkingStatus::Available => QuotaStatus::AVAILABLE,
                UnconfiguredThinkingStatus::Primary => primary,
            },
        };
        QuotaSnapshot { thinking, primary }
    }
}
