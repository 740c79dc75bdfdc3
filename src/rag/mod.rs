//! 检索增强生成链路：历史过滤 → 查询改写 → 多路检索 → 上下文拼接 → 作答。

mod context;
mod history;
mod model;
mod multi_query;
mod pipeline;
pub mod prompts;
mod rewrite;

pub use context::format_docs;
pub use history::{HistoryItem, filter_history};
pub use model::{ChatModel, CompletionRequest};
pub use multi_query::MultiQueryRetriever;
pub use pipeline::GenerationPipeline;
pub use rewrite::QueryRewriter;

#[cfg(test)]
pub(crate) mod testing;
