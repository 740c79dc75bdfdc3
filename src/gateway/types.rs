use crate::quota::QuotaSnapshot;
use crate::rag::HistoryItem;
use serde::{Deserialize, Serialize};

pub const ASK_SUCCESS_MESSAGE: &str = "Answer generated successfully.";

#[derive(Debug, Clone, Deserialize)]
pub struct AskRequest {
    pub query: String,
    #[serde(default)]
    pub thinking: bool,
    #[serde(default)]
    pub history: Vec<HistoryItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AskResponse {
    pub status: bool,
    pub message: String,
    pub answer: String,
    pub timestamp: String,
    /// 生成耗时（秒，保留三位小数）。
    pub latency: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuotaResponse {
    pub status: bool,
    pub quota: QuotaSnapshot,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: bool,
    pub message: String,
    pub timestamp: String,
}

pub fn round_latency(secs: f64) -> f64 {
    (secs * 1000.0).round() / 1000.0
}
