use crate::error::RagError;
use crate::logging::format_duration_ms;
use crate::rag::{
    ChatModel, CompletionRequest, HistoryItem, MultiQueryRetriever, QueryRewriter,
    filter_history, format_docs, prompts,
};
use crate::retrieval::Retriever;
use std::sync::Arc;
use std::time::Instant;

/// 绑定单个模型的完整生成链路。构建后只读，可被并发调用。
#[derive(Clone)]
pub struct GenerationPipeline {
    model: Arc<dyn ChatModel>,
    rewriter: QueryRewriter,
    retriever: MultiQueryRetriever,
    system_prompt: Arc<str>,
}

impl GenerationPipeline {
    pub fn new(
        model: Arc<dyn ChatModel>,
        retriever: Arc<dyn Retriever>,
        system_prompt: impl Into<Arc<str>>,
        multi_query_count: usize,
    ) -> Self {
        Self {
            rewriter: QueryRewriter::new(model.clone()),
            retriever: MultiQueryRetriever::new(model.clone(), retriever, multi_query_count),
            model,
            system_prompt: system_prompt.into(),
        }
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// 任一步骤失败都原样返回，不重试。
    pub async fn run(&self, query: &str, history: &[HistoryItem]) -> Result<String, RagError> {
        let history = filter_history(history, query);

        let start = Instant::now();
        let standalone = self.rewriter.rewrite(query, &history).await?;
        let rewrite_ms = format_duration_ms(start.elapsed());

        let start = Instant::now();
        let docs = self.retriever.retrieve(&standalone).await?;
        let context = format_docs(&docs);
        let retrieve_ms = format_duration_ms(start.elapsed());

        // 作答用原始问题，改写后的查询只用于检索。
        let start = Instant::now();
        let req = CompletionRequest::with_system(
            self.system_prompt.as_ref(),
            prompts::answer_prompt(query, &context),
        );
        let answer = self.model.complete(&req).await?;
        let answer_ms = format_duration_ms(start.elapsed());

        tracing::debug!(
            model = self.model.name(),
            history = history.len(),
            docs = docs.len(),
            rewrite_ms,
            retrieve_ms,
            answer_ms,
            "生成完成 (检索查询: {standalone})"
        );
        Ok(answer)
    }
}
