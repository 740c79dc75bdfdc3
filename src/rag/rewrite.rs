use crate::error::RagError;
use crate::rag::prompts::{self, REWRITE_QUERY_MARKER};
use crate::rag::{ChatModel, CompletionRequest, HistoryItem};
use std::sync::Arc;

/// 结合历史把追问改写成可独立检索的查询。
#[derive(Clone)]
pub struct QueryRewriter {
    model: Arc<dyn ChatModel>,
}

impl QueryRewriter {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    /// 每次都调用模型（无历史时模型应原样返回）。模型失败直接上抛；空输出退回原查询。
    pub async fn rewrite(&self, query: &str, history: &[&HistoryItem]) -> Result<String, RagError> {
        let req = CompletionRequest::with_system(
            prompts::REWRITE_INSTRUCTIONS,
            prompts::rewrite_prompt(query, history),
        );
        let out = self.model.complete(&req).await?;
        let cleaned = clean_rewrite(&out);
        if cleaned.is_empty() {
            tracing::debug!("改写结果为空，使用原查询");
            return Ok(query.to_string());
        }
        Ok(cleaned.to_string())
    }
}

fn clean_rewrite(out: &str) -> &str {
    let s = out.trim();
    let s = s.strip_prefix(REWRITE_QUERY_MARKER).unwrap_or(s).trim();
    s.strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .map(str::trim)
        .unwrap_or(s)
}
