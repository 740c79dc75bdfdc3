use crate::error::RagError;
use crate::rag::{ChatModel, CompletionRequest, prompts};
use crate::retrieval::{Document, Retriever};
use futures::future::try_join_all;
use std::collections::HashSet;
use std::sync::Arc;

/// 让模型生成多个改写问法，并发检索后按来源去重合并。
#[derive(Clone)]
pub struct MultiQueryRetriever {
    model: Arc<dyn ChatModel>,
    retriever: Arc<dyn Retriever>,
    count: usize,
}

impl MultiQueryRetriever {
    pub fn new(model: Arc<dyn ChatModel>, retriever: Arc<dyn Retriever>, count: usize) -> Self {
        Self {
            model,
            retriever,
            count: count.max(1),
        }
    }

    pub async fn retrieve(&self, query: &str) -> Result<Vec<Document>, RagError> {
        let req = CompletionRequest::new(prompts::multi_query_prompt(query, self.count));
        let raw = self.model.complete(&req).await?;

        let mut queries = parse_queries(&raw, self.count);
        if queries.is_empty() {
            queries.push(query.to_string());
        }
        tracing::debug!(count = queries.len(), "多路检索: {queries:?}");

        let results = try_join_all(queries.iter().map(|q| self.retriever.search(q))).await?;
        Ok(dedupe_by_source(results.into_iter().flatten()))
    }
}

/// 每行一个问法；去掉空行、列表序号与重复项，最多保留 `limit` 个。
pub fn parse_queries(raw: &str, limit: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for line in raw.lines() {
        let q = strip_list_marker(line);
        if q.is_empty() || !seen.insert(q) {
            continue;
        }
        out.push(q.to_string());
        if out.len() >= limit {
            break;
        }
    }
    out
}

fn strip_list_marker(line: &str) -> &str {
    let s = line.trim();
    let s = s
        .strip_prefix(['-', '*', '•'])
        .map(str::trim_start)
        .unwrap_or(s);

    let digits = s.bytes().take_while(u8::is_ascii_digit).count();
    let s = if digits > 0
        && let Some(rest) = s[digits..].strip_prefix(['.', ')'])
    {
        rest.trim_start()
    } else {
        s
    };

    s.strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(s)
        .trim()
}

/// 按来源去重，保留首次出现的顺序；无来源的文档按正文去重。
pub fn dedupe_by_source(docs: impl IntoIterator<Item = Document>) -> Vec<Document> {
    let mut seen = HashSet::new();
    docs.into_iter()
        .filter(|d| {
            let key = if d.source.is_empty() {
                &d.content
            } else {
                &d.source
            };
            seen.insert(key.clone())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::testing::{FakeModel, FakeRetriever};

    #[test]
    fn parses_one_query_per_line() {
        let raw = "1. What is bootstrap week?\n\n2) When does bootstrap start?\n- bootstrap schedule\n";
        assert_eq!(
            parse_queries(raw, 3),
            vec![
                "What is bootstrap week?",
                "When does bootstrap start?",
                "bootstrap schedule"
            ]
        );
    }

    #[test]
    fn parse_caps_and_dedupes() {
        let raw = "a\n* a\nb\n\"c\"\nd";
        assert_eq!(parse_queries(raw, 3), vec!["a", "b", "c"]);
        assert!(parse_queries("  \n\n", 3).is_empty());
    }

    #[test]
    fn numbers_without_marker_are_kept() {
        assert_eq!(parse_queries("2024 admission dates", 3), vec!["2024 admission dates"]);
    }

    #[test]
    fn dedupe_keeps_first_seen() {
        let docs = vec![
            Document::new("doc1", "first"),
            Document::new("doc2", "second"),
            Document::new("doc1", "again"),
            Document::new("", "loose"),
            Document::new("", "loose"),
        ];
        let out = dedupe_by_source(docs);
        assert_eq!(
            out,
            vec![
                Document::new("doc1", "first"),
                Document::new("doc2", "second"),
                Document::new("", "loose"),
            ]
        );
    }

    #[tokio::test]
    async fn searches_every_paraphrase_and_merges() {
        let model = Arc::new(FakeModel::new("m", |_| Ok("q1\nq2\nq3".to_string())));
        let retriever = Arc::new(
            FakeRetriever::new()
                .with("q1", vec![Document::new("doc1", "one"), Document::new("doc2", "two")])
                .with("q2", vec![Document::new("doc1", "one")])
                .with("q3", vec![Document::new("doc3", "three")]),
        );
        let mq = MultiQueryRetriever::new(model, retriever.clone(), 3);
        let docs = mq.retrieve("original").await.unwrap();

        let sources: Vec<_> = docs.iter().map(|d| d.source.as_str()).collect();
        assert_eq!(sources, vec!["doc1", "doc2", "doc3"]);
        assert_eq!(retriever.calls(), 3);
    }

    #[tokio::test]
    async fn blank_expansion_searches_original() {
        let model = Arc::new(FakeModel::new("m", |_| Ok(String::new())));
        let retriever = Arc::new(FakeRetriever::new().with("original", vec![Document::new("d", "c")]));
        let docs = MultiQueryRetriever::new(model, retriever.clone(), 3)
            .retrieve("original")
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(retriever.queries(), vec!["original".to_string()]);
    }

    #[tokio::test]
    async fn retrieval_error_propagates() {
        let model = Arc::new(FakeModel::new("m", |_| Ok("q1\nq2".to_string())));
        let retriever = Arc::new(FakeRetriever::failing("qdrant down"));
        let err = MultiQueryRetriever::new(model, retriever, 3)
            .retrieve("x")
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Retrieval(_)));
    }
}
