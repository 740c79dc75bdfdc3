//! 检索服务：查询向量化 + Qdrant 向量检索。
//!
//! 对生成链路只暴露 `Retriever` 接口，嵌入模型与向量库都是外部 HTTP 服务。

mod embedding;
mod qdrant;

pub use embedding::EmbeddingClient;
pub use qdrant::{QdrantClient, SearchParams};

use crate::config::Config;
use crate::error::RagError;
use async_trait::async_trait;

/// 一条检索结果：正文 + 来源定位（通常是 URL）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub content: String,
    pub source: String,
}

impl Document {
    pub fn new(source: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            source: source.into(),
        }
    }
}

#[async_trait]
pub trait Retriever: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<Document>, RagError>;
}

/// 基于嵌入服务 + Qdrant 的检索实现。
#[derive(Debug, Clone)]
pub struct VectorRetriever {
    embedder: EmbeddingClient,
    qdrant: QdrantClient,
    collection: String,
    params: SearchParams,
}

impl VectorRetriever {
    pub fn new(
        embedder: EmbeddingClient,
        qdrant: QdrantClient,
        collection: impl Into<String>,
        params: SearchParams,
    ) -> Self {
        Self {
            embedder,
            qdrant,
            collection: collection.into(),
            params,
        }
    }

    pub fn from_config(cfg: &Config) -> Result<Self, anyhow::Error> {
        let params = SearchParams::from_kwargs(&cfg.rag.search_kwargs)?;
        Ok(Self::new(
            EmbeddingClient::new(cfg)?,
            QdrantClient::new(cfg)?,
            cfg.rag.collection.clone(),
            params,
        ))
    }
}

#[async_trait]
impl Retriever for VectorRetriever {
    async fn search(&self, query: &str) -> Result<Vec<Document>, RagError> {
        let vector = self.embedder.embed(query).await?;
        self.qdrant
            .search(&self.collection, &vector, &self.params)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogLevel;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn retriever(uri: &str) -> VectorRetriever {
        let timeout = Some(Duration::from_secs(5));
        let embedder = EmbeddingClient::with_base_url(uri, None, "mini-lm", timeout, 16).unwrap();
        let qdrant =
            QdrantClient::with_base_url(uri, Some("q-key"), timeout, LogLevel::Off).unwrap();
        let params = SearchParams {
            limit: 2,
            score_threshold: None,
            filter: None,
        };
        VectorRetriever::new(embedder, qdrant, "pesu", params)
    }

    #[tokio::test]
    async fn search_embeds_then_queries_collection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .and(body_partial_json(json!({"model": "mini-lm", "input": ["bootstrap"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"index": 0, "embedding": [0.1, 0.2, 0.3]}]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/collections/pesu/points/search"))
            .and(header("api-key", "q-key"))
            .and(body_partial_json(json!({"limit": 2, "with_payload": true})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": [
                    {"id": 1, "score": 0.9, "payload": {
                        "page_content": "Bootstrap is orientation week.",
                        "metadata": {"url": "https://pes.edu/bootstrap"}
                    }},
                    {"id": 2, "score": 0.5, "payload": {"metadata": {"url": "https://pes.edu/empty"}}},
                    {"id": 3, "score": 0.4, "payload": {"page_content": "No url here."}}
                ],
                "status": "ok"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let docs = retriever(&server.uri()).search("bootstrap").await.unwrap();
        assert_eq!(
            docs,
            vec![
                Document::new("https://pes.edu/bootstrap", "Bootstrap is orientation week."),
                Document::new("", "No url here."),
            ]
        );
    }

    #[tokio::test]
    async fn repeated_query_reuses_cached_embedding() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"embedding": [1.0, 0.0]}]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/collections/pesu/points/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": []})))
            .expect(2)
            .mount(&server)
            .await;

        let r = retriever(&server.uri());
        assert!(r.search("fees").await.unwrap().is_empty());
        assert!(r.search("fees").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_identical_queries_share_one_embedding_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"data": [{"embedding": [0.5, 0.5]}]}))
                    .set_delay(Duration::from_millis(200)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let embedder =
            EmbeddingClient::with_base_url(&server.uri(), None, "mini-lm", None, 16).unwrap();
        let (a, b, c) = tokio::join!(
            embedder.embed("hostel fees"),
            embedder.embed("hostel fees"),
            embedder.embed("hostel fees"),
        );
        assert_eq!(*a.unwrap(), vec![0.5, 0.5]);
        assert_eq!(*b.unwrap(), vec![0.5, 0.5]);
        assert_eq!(*c.unwrap(), vec![0.5, 0.5]);
    }

    #[tokio::test]
    async fn failed_embedding_is_not_cached() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;

        let embedder =
            EmbeddingClient::with_base_url(&server.uri(), None, "mini-lm", None, 16).unwrap();
        assert!(matches!(embedder.embed("x").await, Err(RagError::Retrieval(_))));
        assert!(matches!(embedder.embed("x").await, Err(RagError::Retrieval(_))));
    }

    #[tokio::test]
    async fn qdrant_failure_is_retrieval_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"embedding": [1.0]}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/collections/pesu/points/search"))
            .respond_with(ResponseTemplate::new(404).set_body_string("Not found: Collection `pesu`"))
            .mount(&server)
            .await;

        let err = retriever(&server.uri()).search("x").await.unwrap_err();
        assert!(matches!(err, RagError::Retrieval(_)));
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn embedding_failure_is_retrieval_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .mount(&server)
            .await;

        let err = retriever(&server.uri()).search("x").await.unwrap_err();
        assert!(matches!(err, RagError::Retrieval(_)));
    }
}
