use crate::error::RagError;
use crate::gemini::client::{ApiError, GeminiClient};
use crate::gemini::types::{GenerationConfig, Request, ThinkingConfig};
use crate::rag::{ChatModel, CompletionRequest};
use async_trait::async_trait;

/// 绑定到某个具体 Gemini 模型的 `ChatModel`。
#[derive(Debug, Clone)]
pub struct GeminiModel {
    client: GeminiClient,
    model: String,
    generation_config: Option<GenerationConfig>,
}

impl GeminiModel {
    pub fn new(client: GeminiClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            generation_config: None,
        }
    }

    /// thinking 后端可指定思考预算；不输出思考内容。
    pub fn with_thinking_budget(mut self, budget: Option<i32>) -> Self {
        if let Some(budget) = budget {
            let cfg = self.generation_config.get_or_insert_with(GenerationConfig::default);
            cfg.thinking_config = Some(ThinkingConfig {
                include_thoughts: false,
                thinking_budget: budget,
            });
        }
        self
    }
}

#[async_trait]
impl ChatModel for GeminiModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, req: &CompletionRequest) -> Result<String, RagError> {
        let body = Request::single_turn(
            req.system.as_deref(),
            &req.prompt,
            self.generation_config.clone(),
        );
        let resp = self
            .client
            .generate_content(&self.model, &body)
            .await
            .map_err(map_api_error)?;

        match resp.text() {
            Some(text) => Ok(text),
            None => Err(RagError::provider(format!(
                "{} 未返回候选内容 (finishReason={})",
                self.model,
                resp.finish_reason()
            ))),
        }
    }
}

fn map_api_error(err: ApiError) -> RagError {
    if err.is_resource_exhausted() {
        RagError::quota_exceeded(err.to_string())
    } else {
        RagError::provider(err.to_string())
    }
}
