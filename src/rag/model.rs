use crate::error::RagError;
use async_trait::async_trait;

/// 一次单轮补全：可选系统指令 + 用户输入。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub prompt: String,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
        }
    }

    pub fn with_system(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: Some(system.into()),
            prompt: prompt.into(),
        }
    }
}

/// 文本补全模型。配额耗尽必须返回 `RagError::QuotaExceeded`。
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, req: &CompletionRequest) -> Result<String, RagError>;
}
