//! 按请求模式与配额状态选择生成链路。

use crate::error::RagError;
use crate::quota::{QuotaBoard, QuotaState};
use crate::rag::{GenerationPipeline, HistoryItem};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Primary,
    Thinking,
}

impl Mode {
    pub fn from_thinking(thinking: bool) -> Self {
        if thinking { Self::Thinking } else { Self::Primary }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Thinking => "thinking",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    /// 后端处于冷却期，或本次调用触发了配额耗尽。
    #[error("{mode} 后端配额不可用: {message}")]
    QuotaExceeded {
        mode: Mode,
        message: String,
        next_available: Option<DateTime<Utc>>,
    },

    #[error(transparent)]
    Pipeline(#[from] RagError),
}

pub struct Dispatcher {
    board: Arc<QuotaBoard>,
    primary: Arc<GenerationPipeline>,
    thinking: Option<Arc<GenerationPipeline>>,
}

impl Dispatcher {
    pub fn new(
        board: Arc<QuotaBoard>,
        primary: Arc<GenerationPipeline>,
        thinking: Option<Arc<GenerationPipeline>>,
    ) -> Self {
        if thinking.is_some() != board.thinking().is_some() {
            tracing::warn!("thinking 链路与配额状态不一致，thinking 请求将回退到 primary");
        }
        Self {
            board,
            primary,
            thinking,
        }
    }

    pub fn board(&self) -> &Arc<QuotaBoard> {
        &self.board
    }

    /// 实际处理请求的模式：thinking 未配置时为 primary。
    pub fn resolve(&self, requested: Mode) -> Mode {
        self.route(requested).0
    }

    fn route(&self, requested: Mode) -> (Mode, &Arc<QuotaState>, &Arc<GenerationPipeline>) {
        if requested == Mode::Thinking
            && let (Some(state), Some(pipeline)) = (self.board.thinking(), &self.thinking)
        {
            return (Mode::Thinking, state, pipeline);
        }
        (Mode::Primary, self.board.primary(), &self.primary)
    }

    pub async fn serve(
        &self,
        query: &str,
        requested: Mode,
        history: &[HistoryItem],
    ) -> Result<String, DispatchError> {
        let (mode, state, pipeline) = self.route(requested);
        if mode != requested {
            tracing::debug!("thinking 模型未配置，请求由 primary 处理");
        }

        let status = state.check().await;
        if !status.available {
            return Err(DispatchError::QuotaExceeded {
                mode,
                message: format!(
                    "{} 后端 ({}) 处于冷却期",
                    state.name(),
                    pipeline.model_name()
                ),
                next_available: status.next_available,
            });
        }

        match pipeline.run(query, history).await {
            Ok(answer) => Ok(answer),
            Err(RagError::QuotaExceeded(message)) => {
                let until = state.disable().await;
                Err(DispatchError::QuotaExceeded {
                    mode,
                    message,
                    next_available: Some(until),
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quota::{DEFAULT_COOLDOWN, UnconfiguredThinkingStatus};
    use crate::rag::testing::{FakeModel, FakeRetriever};
    use crate::retrieval::Document;
    use chrono::TimeDelta;

    struct Fixture {
        dispatcher: Dispatcher,
        primary: Arc<FakeModel>,
        thinking: Option<Arc<FakeModel>>,
    }

    fn fixture(primary: FakeModel, thinking: Option<FakeModel>) -> Fixture {
        let retriever = Arc::new(FakeRetriever::new().with(
            "What is bootstrap?",
            vec![Document::new("https://pes.edu/bootstrap", "Orientation week.")],
        ));
        let primary = Arc::new(primary);
        let thinking = thinking.map(Arc::new);
        let board = Arc::new(QuotaBoard::new(
            DEFAULT_COOLDOWN,
            thinking.is_some(),
            UnconfiguredThinkingStatus::Available,
        ));
        let pipeline = |m: &Arc<FakeModel>| {
            Arc::new(GenerationPipeline::new(
                m.clone(),
                retriever.clone(),
                "system",
                3,
            ))
        };
        let dispatcher = Dispatcher::new(
            board,
            pipeline(&primary),
            thinking.as_ref().map(pipeline),
        );
        Fixture {
            dispatcher,
            primary,
            thinking,
        }
    }

    #[tokio::test]
    async fn thinking_request_served_by_thinking_pipeline() {
        let f = fixture(
            FakeModel::answering("flash", "primary answer"),
            Some(FakeModel::answering("pro", "thinking answer")),
        );
        let out = f
            .dispatcher
            .serve("What is bootstrap?", Mode::Thinking, &[])
            .await
            .unwrap();
        assert_eq!(out, "thinking answer");
        assert_eq!(f.primary.calls(), 0);

        let snap = f.dispatcher.board().snapshot().await;
        assert!(snap.thinking.available);
        assert!(snap.thinking.next_available.is_none());
    }

    #[tokio::test]
    async fn provider_exhaustion_disables_backend() {
        let f = fixture(
            FakeModel::failing("flash", RagError::quota_exceeded("RESOURCE_EXHAUSTED")),
            Some(FakeModel::answering("pro", "thinking answer")),
        );
        let before = Utc::now();
        let err = f
            .dispatcher
            .serve("What is bootstrap?", Mode::Primary, &[])
            .await
            .unwrap_err();

        let until = match err {
            DispatchError::QuotaExceeded {
                mode: Mode::Primary,
                next_available: Some(until),
                ..
            } => until,
            other => panic!("expected primary quota error, got {other:?}"),
        };
        let expected = before + TimeDelta::hours(24);
        assert!((until - expected).num_seconds().abs() <= 5);

        let snap = f.dispatcher.board().snapshot().await;
        assert!(!snap.primary.available);
        assert_eq!(snap.primary.next_available, Some(until));
        assert!(snap.thinking.available);
    }

    #[tokio::test]
    async fn disabled_backend_rejected_without_invocation() {
        let f = fixture(
            FakeModel::answering("flash", "primary answer"),
            Some(FakeModel::answering("pro", "thinking answer")),
        );
        let until = f.dispatcher.board().thinking().unwrap().disable().await;

        let err = f
            .dispatcher
            .serve("What is bootstrap?", Mode::Thinking, &[])
            .await
            .unwrap_err();
        match err {
            DispatchError::QuotaExceeded {
                mode,
                next_available,
                ..
            } => {
                assert_eq!(mode, Mode::Thinking);
                assert_eq!(next_available, Some(until));
            }
            other => panic!("expected quota error, got {other:?}"),
        }
        assert_eq!(f.thinking.as_ref().unwrap().calls(), 0);
        assert_eq!(f.primary.calls(), 0);

        let err = f
            .dispatcher
            .serve("What is bootstrap?", Mode::Thinking, &[])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("thinking 后端 (pro)"));
    }

    #[tokio::test]
    async fn unconfigured_thinking_falls_back_to_primary() {
        let f = fixture(FakeModel::answering("flash", "primary answer"), None);
        assert_eq!(f.dispatcher.resolve(Mode::Thinking), Mode::Primary);
        assert!(f.dispatcher.board().thinking().is_none());

        let out = f
            .dispatcher
            .serve("What is bootstrap?", Mode::Thinking, &[])
            .await
            .unwrap();
        assert_eq!(out, "primary answer");
        assert_eq!(f.primary.calls(), 3);
    }

    #[tokio::test]
    async fn fallback_uses_primary_quota() {
        let f = fixture(FakeModel::answering("flash", "primary answer"), None);
        f.dispatcher.board().primary().disable().await;

        let err = f
            .dispatcher
            .serve("What is bootstrap?", Mode::Thinking, &[])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::QuotaExceeded {
                mode: Mode::Primary,
                ..
            }
        ));
        assert_eq!(f.primary.calls(), 0);
    }

    #[tokio::test]
    async fn other_failures_leave_quota_untouched() {
        let f = fixture(
            FakeModel::failing("flash", RagError::provider("503 UNAVAILABLE")),
            None,
        );
        let err = f
            .dispatcher
            .serve("What is bootstrap?", Mode::Primary, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Pipeline(RagError::Provider(_))));
        assert!(f.dispatcher.board().snapshot().await.primary.available);
    }

    #[tokio::test]
    async fn expired_cooldown_is_served_again() {
        let f = fixture(FakeModel::answering("flash", "primary answer"), None);
        let primary = f.dispatcher.board().primary();
        primary
            .disable_at(Utc::now() - TimeDelta::hours(25))
            .await;

        let out = f
            .dispatcher
            .serve("What is bootstrap?", Mode::Primary, &[])
            .await
            .unwrap();
        assert_eq!(out, "primary answer");
        assert!(primary.status().await.available);
    }

    #[test]
    fn mode_from_flag() {
        assert_eq!(Mode::from_thinking(true), Mode::Thinking);
        assert_eq!(Mode::from_thinking(false), Mode::Primary);
        assert_eq!(Mode::Thinking.to_string(), "thinking");
    }
}
