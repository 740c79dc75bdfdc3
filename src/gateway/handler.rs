use crate::dispatch::{DispatchError, Dispatcher, Mode};
use crate::error::AppError;
use crate::gateway::types::{
    ASK_SUCCESS_MESSAGE, AskRequest, AskResponse, HealthResponse, QuotaResponse, round_latency,
};
use crate::logging::{self, LogLevel};
use crate::util::{id, time};
use axum::Json;
use axum::body::Bytes;
use axum::extract::{OriginalUri, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{Html, IntoResponse, Response};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

pub const THINKING_UNAVAILABLE_MESSAGE: &str = "Thinking mode is temporarily unavailable due to quota limits. \
Please try again later, or disable 'thinking' mode if enabled.";
pub const PRIMARY_UNAVAILABLE_MESSAGE: &str =
    "Primary LLM is temporarily unavailable due to quota limits. Please try again later.";

pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub log_level: LogLevel,
    pub static_dir: PathBuf,
}

pub async fn handle_ask(
    State(state): State<Arc<AppState>>,
    uri: OriginalUri,
    body: Bytes,
) -> Response {
    let start = Instant::now();
    logging::client_request(state.log_level, "POST", uri.0.path(), body.as_ref());

    let span = tracing::info_span!("ask", id = %id::request_id());
    let result = ask(&state, body.as_ref()).instrument(span).await;
    finish(state.log_level, start, result)
}

async fn ask(state: &AppState, body: &[u8]) -> Result<AskResponse, AppError> {
    let timestamp = time::now_rfc3339();
    let req: AskRequest = sonic_rs::from_slice(body).map_err(|e| {
        tracing::debug!("请求体解析失败: {e}");
        AppError::bad_request("Invalid request body.")
    })?;
    if req.query.trim().is_empty() {
        return Err(AppError::bad_request("Query must not be empty."));
    }

    let requested = Mode::from_thinking(req.thinking);
    tracing::debug!(
        mode = %requested,
        history = req.history.len(),
        "收到提问: {}",
        req.query
    );

    let start = Instant::now();
    match state
        .dispatcher
        .serve(&req.query, requested, &req.history)
        .await
    {
        Ok(answer) => {
            let latency = round_latency(start.elapsed().as_secs_f64());
            let served = state.dispatcher.resolve(requested);
            tracing::info!(mode = %served, latency, "回答生成完成");
            Ok(AskResponse {
                status: true,
                message: ASK_SUCCESS_MESSAGE.to_string(),
                answer,
                timestamp,
                latency,
            })
        }
        Err(DispatchError::QuotaExceeded { mode, message, .. }) => {
            tracing::debug!("配额错误详情: {message}");
            Err(AppError::QuotaExceeded {
                message: quota_message(mode).to_string(),
                quota: state.dispatcher.board().snapshot().await,
                timestamp: time::now_rfc3339(),
            })
        }
        Err(DispatchError::Pipeline(e)) => Err(e.into()),
    }
}

fn quota_message(mode: Mode) -> &'static str {
    match mode {
        Mode::Thinking => THINKING_UNAVAILABLE_MESSAGE,
        Mode::Primary => PRIMARY_UNAVAILABLE_MESSAGE,
    }
}

fn finish<T: Serialize>(level: LogLevel, start: Instant, result: Result<T, AppError>) -> Response {
    match result {
        Ok(body) => match sonic_rs::to_vec(&body) {
            Ok(bytes) => {
                logging::client_response(level, StatusCode::OK.as_u16(), start.elapsed(), &bytes);
                ([(CONTENT_TYPE, "application/json")], bytes).into_response()
            }
            Err(e) => AppError::Anyhow(e.into()).into_response(),
        },
        Err(err) => {
            let resp = err.into_response();
            logging::client_response(level, resp.status().as_u16(), start.elapsed(), &[]);
            resp
        }
    }
}

pub async fn handle_quota(State(state): State<Arc<AppState>>) -> Json<QuotaResponse> {
    tracing::debug!("查询配额状态");
    Json(QuotaResponse {
        status: true,
        quota: state.dispatcher.board().snapshot().await,
        timestamp: time::now_rfc3339(),
    })
}

pub async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: true,
        message: "ok".to_string(),
        timestamp: time::now_rfc3339(),
    })
}

/// 前端构建产物的入口页。
pub async fn handle_index(State(state): State<Arc<AppState>>) -> Result<Html<Vec<u8>>, AppError> {
    let path = state.static_dir.join("index.html");
    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok(Html(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!("找不到前端入口文件: {}", path.display());
            Err(AppError::not_found("index.html not found."))
        }
        Err(e) => Err(e.into()),
    }
}
