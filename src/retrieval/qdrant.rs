use crate::config::Config;
use crate::error::RagError;
use crate::logging::{self, LogLevel};
use crate::retrieval::Document;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

const DEFAULT_LIMIT: usize = 4;

/// 检索参数（配置文件 `rag.search_kwargs`）。
#[derive(Debug, Clone, PartialEq)]
pub struct SearchParams {
    pub limit: usize,
    pub score_threshold: Option<f32>,
    /// Qdrant filter，原样透传。
    pub filter: Option<serde_json::Value>,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            score_threshold: None,
            filter: None,
        }
    }
}

impl SearchParams {
    /// 识别 k / score_threshold / filter，其余键忽略并告警。
    pub fn from_kwargs(
        kwargs: &BTreeMap<String, serde_json::Value>,
    ) -> Result<Self, anyhow::Error> {
        let mut out = Self::default();
        for (key, value) in kwargs {
            match key.as_str() {
                "k" => {
                    out.limit = value
                        .as_u64()
                        .filter(|k| *k > 0)
                        .map(|k| k as usize)
                        .ok_or_else(|| anyhow::anyhow!("search_kwargs.k 必须是正整数: {value}"))?;
                }
                "score_threshold" => {
                    out.score_threshold = Some(value.as_f64().ok_or_else(|| {
                        anyhow::anyhow!("search_kwargs.score_threshold 必须是数字: {value}")
                    })? as f32);
                }
                "filter" => out.filter = Some(value.clone()),
                other => tracing::warn!("忽略未知的 search_kwargs 参数: {other}"),
            }
        }
        Ok(out)
    }
}

/// Qdrant REST 检索客户端。
#[derive(Debug, Clone)]
pub struct QdrantClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    log_level: LogLevel,
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    vector: &'a [f32],
    limit: usize,
    with_payload: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    score_threshold: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<&'a serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    result: Vec<ScoredPoint>,
}

#[derive(Debug, Deserialize)]
struct ScoredPoint {
    #[serde(default)]
    payload: Option<Payload>,
}

/// LangChain-Qdrant 的 payload 布局。
#[derive(Debug, Deserialize)]
struct Payload {
    #[serde(default)]
    page_content: Option<String>,
    #[serde(default)]
    metadata: Option<Metadata>,
}

#[derive(Debug, Deserialize)]
struct Metadata {
    #[serde(default)]
    url: Option<String>,
}

impl QdrantClient {
    pub fn new(cfg: &Config) -> Result<Self, anyhow::Error> {
        Self::with_base_url(
            &cfg.qdrant_url,
            cfg.qdrant_api_key.as_deref(),
            cfg.timeout(),
            cfg.log_level(),
        )
    }

    pub fn with_base_url(
        base_url: &str,
        api_key: Option<&str>,
        timeout: Option<Duration>,
        log_level: LogLevel,
    ) -> Result<Self, anyhow::Error> {
        let mut builder = reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90));
        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }
        Ok(Self {
            http: builder.build()?,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            api_key: api_key.map(str::to_string),
            log_level,
        })
    }

    fn build_headers(&self) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = &self.api_key
            && let Ok(v) = HeaderValue::from_str(key)
        {
            h.insert(HeaderName::from_static("api-key"), v);
        }
        h
    }

    pub async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        params: &SearchParams,
    ) -> Result<Vec<Document>, RagError> {
        let url = format!(
            "{}/collections/{}/points/search",
            self.base_url,
            collection.trim()
        );
        let body = sonic_rs::to_vec(&SearchRequest {
            vector,
            limit: params.limit,
            with_payload: true,
            score_threshold: params.score_threshold,
            filter: params.filter.as_ref(),
        })
        .map_err(|e| RagError::retrieval(format!("检索请求序列化失败: {e}")))?;
        logging::backend_request(self.log_level, "POST", &url, &[]);

        let start = std::time::Instant::now();
        let resp = self
            .http
            .post(url)
            .headers(self.build_headers())
            .body(body)
            .send()
            .await
            .map_err(|e| RagError::retrieval(format!("Qdrant 请求失败: {e}")))?;

        let status = resp.status();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| RagError::retrieval(format!("读取 Qdrant 响应失败: {e}")))?;
        logging::backend_response(self.log_level, status.as_u16(), start.elapsed(), &bytes);

        if !status.is_success() {
            return Err(RagError::retrieval(format!(
                "Qdrant 返回 {}: {}",
                status.as_u16(),
                logging::truncate_text_for_log(&String::from_utf8_lossy(&bytes))
            )));
        }

        let parsed: SearchResponse = sonic_rs::from_slice(&bytes)
            .map_err(|e| RagError::retrieval(format!("解析 Qdrant 响应失败: {e}")))?;

        let mut docs = Vec::with_capacity(parsed.result.len());
        for point in parsed.result {
            let Some(payload) = point.payload else {
                continue;
            };
            let Some(content) = payload.page_content else {
                continue;
            };
            let source = payload.metadata.and_then(|m| m.url).unwrap_or_default();
            docs.push(Document { content, source });
        }
        Ok(docs)
    }
}
