use crate::config::Config;
use crate::error::RagError;
use moka::future::Cache;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// OpenAI 兼容的 `/v1/embeddings` 客户端（TEI / vLLM / OpenAI 均可）。
///
/// 查询向量按原文缓存：多路改写与重复提问经常产生相同的查询。
#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    http: reqwest::Client,
    url: String,
    api_key: Option<String>,
    model: String,
    cache: Cache<String, Arc<Vec<f32>>>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: [&'a str; 1],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl EmbeddingClient {
    pub fn new(cfg: &Config) -> Result<Self, anyhow::Error> {
        Self::with_base_url(
            &cfg.embedding_url,
            cfg.embedding_api_key.as_deref(),
            &cfg.rag.embedding_model,
            cfg.timeout(),
            cfg.embedding_cache_capacity,
        )
    }

    pub fn with_base_url(
        base_url: &str,
        api_key: Option<&str>,
        model: &str,
        timeout: Option<Duration>,
        cache_capacity: u64,
    ) -> Result<Self, anyhow::Error> {
        let mut builder = reqwest::Client::builder().pool_idle_timeout(Duration::from_secs(90));
        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }

        let base = base_url.trim().trim_end_matches('/');
        let url = if base.ends_with("/embeddings") {
            base.to_string()
        } else {
            format!("{base}/v1/embeddings")
        };

        Ok(Self {
            http: builder.build()?,
            url,
            api_key: api_key.map(str::to_string),
            model: model.to_string(),
            cache: Cache::new(cache_capacity),
        })
    }

    /// 同一查询的并发请求只会触发一次嵌入调用；失败不缓存。
    pub async fn embed(&self, text: &str) -> Result<Arc<Vec<f32>>, RagError> {
        self.cache
            .try_get_with_by_ref(text, async { self.fetch(text).await.map(Arc::new) })
            .await
            .map_err(|e| (*e).clone())
    }

    async fn fetch(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = &self.api_key
            && let Ok(v) = HeaderValue::from_str(&format!("Bearer {key}"))
        {
            headers.insert(AUTHORIZATION, v);
        }

        let body = sonic_rs::to_vec(&EmbeddingRequest {
            model: &self.model,
            input: [text],
        })
        .map_err(|e| RagError::retrieval(format!("嵌入请求序列化失败: {e}")))?;

        let resp = self
            .http
            .post(&self.url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| RagError::retrieval(format!("嵌入服务请求失败: {e}")))?;

        let status = resp.status();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| RagError::retrieval(format!("读取嵌入响应失败: {e}")))?;
        if !status.is_success() {
            return Err(RagError::retrieval(format!(
                "嵌入服务返回 {}: {}",
                status.as_u16(),
                crate::logging::truncate_text_for_log(&String::from_utf8_lossy(&bytes))
            )));
        }

        let parsed: EmbeddingResponse = sonic_rs::from_slice(&bytes)
            .map_err(|e| RagError::retrieval(format!("解析嵌入响应失败: {e}")))?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| RagError::retrieval("嵌入服务未返回向量"))
    }
}
