use crate::config::Config;
use crate::gemini::types::{Request, Response};
use crate::logging::{self, LogLevel};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use std::time::Duration;
use thiserror::Error;

const API_KEY_HEADER: HeaderName = HeaderName::from_static("x-goog-api-key");

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Gemini API 错误 {status}: {message}")]
    Http {
        status: u16,
        /// google.rpc 状态名，例如 RESOURCE_EXHAUSTED。
        rpc_status: String,
        message: String,
    },

    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] sonic_rs::Error),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// 上游配额/限流耗尽：HTTP 429 或 RESOURCE_EXHAUSTED。
    pub fn is_resource_exhausted(&self) -> bool {
        match self {
            Self::Http {
                status, rpc_status, ..
            } => *status == 429 || rpc_status.eq_ignore_ascii_case("RESOURCE_EXHAUSTED"),
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    log_level: LogLevel,
}

impl GeminiClient {
    pub fn new(cfg: &Config) -> Result<Self, anyhow::Error> {
        Self::with_base_url(
            &cfg.gemini_base_url,
            &cfg.gemini_api_key,
            cfg.timeout(),
            cfg.log_level(),
        )
    }

    pub fn with_base_url(
        base_url: &str,
        api_key: &str,
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
            api_key: api_key.trim().to_string(),
            log_level,
        })
    }

    pub fn generate_content_url(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url,
            model.trim()
        )
    }

    fn build_headers(&self) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Ok(v) = HeaderValue::from_str(&self.api_key) {
            h.insert(API_KEY_HEADER, v);
        }
        h
    }

    /// 单次非流式调用。不做重试：配额耗尽需要原样交给上层处理。
    pub async fn generate_content(&self, model: &str, req: &Request) -> Result<Response, ApiError> {
        let url = self.generate_content_url(model);
        let body = sonic_rs::to_vec(req)?;
        logging::backend_request(self.log_level, "POST", &url, &body);

        let start = std::time::Instant::now();
        let resp = self
            .http
            .post(url)
            .headers(self.build_headers())
            .body(body)
            .send()
            .await?;

        let status = resp.status();
        let bytes = resp.bytes().await?;
        logging::backend_response(self.log_level, status.as_u16(), start.elapsed(), &bytes);

        if !status.is_success() {
            return Err(extract_error_details(status.as_u16(), &bytes));
        }
        Ok(sonic_rs::from_slice::<Response>(&bytes)?)
    }
}

fn extract_error_details(status: u16, body: &[u8]) -> ApiError {
    #[derive(Debug, serde::Deserialize)]
    struct ErrResp {
        error: ErrInner,
    }

    #[derive(Debug, serde::Deserialize)]
    struct ErrInner {
        #[serde(default)]
        code: Option<sonic_rs::Value>,
        #[serde(default)]
        message: String,
        #[serde(default)]
        status: String,
    }

    let mut out_status = status;
    let mut rpc_status = String::new();
    let mut message = String::from_utf8_lossy(body).trim().to_string();
    if message.is_empty() {
        message = "Unknown error".to_string();
    }

    if let Ok(err_resp) = sonic_rs::from_slice::<ErrResp>(body) {
        let err = err_resp.error;
        if !err.message.is_empty() {
            message = err.message;
        }
        rpc_status = err.status;

        if let Some(code) = err.code {
            use sonic_rs::JsonValueTrait;
            if let Some(s) = code.as_str() {
                if s.eq_ignore_ascii_case("RESOURCE_EXHAUSTED") {
                    out_status = 429;
                    rpc_status = s.to_uppercase();
                }
            } else if let Some(i) = code.as_i64()
                && i > 0
                && i <= u16::MAX as i64
            {
                out_status = i as u16;
            }
        }
    }

    ApiError::Http {
        status: out_status,
        rpc_status,
        message: logging::truncate_text_for_log(&message),
    }
}
