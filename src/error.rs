use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::quota::QuotaSnapshot;

pub const INTERNAL_ERROR_MESSAGE: &str = "Internal Server Error. Please try again later.";

/// 生成链路（检索 + 模型）中可能出现的错误。
///
/// 只有 `QuotaExceeded` 会触发配额状态迁移，其余错误原样向上传播。
#[derive(Debug, Clone, Error)]
pub enum RagError {
    #[error("模型配额耗尽: {0}")]
    QuotaExceeded(String),

    #[error("检索失败: {0}")]
    Retrieval(String),

    #[error("模型请求失败: {0}")]
    Provider(String),
}

impl RagError {
    pub fn quota_exceeded(message: impl Into<String>) -> Self {
        Self::QuotaExceeded(message.into())
    }

    pub fn retrieval(message: impl Into<String>) -> Self {
        Self::Retrieval(message.into())
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider(message.into())
    }

    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, Self::QuotaExceeded(_))
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("参数错误: {0}")]
    BadRequest(String),

    /// 面向调用方的配额错误：携带最新的配额快照，便于前端展示恢复时间。
    #[error("{message}")]
    QuotaExceeded {
        message: String,
        quota: QuotaSnapshot,
        timestamp: String,
    },

    #[error("资源不存在: {0}")]
    NotFound(String),

    #[error(transparent)]
    Rag(#[from] RagError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    status: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    quota: Option<QuotaSnapshot>,
    timestamp: String,
}

impl AppError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let timestamp = crate::util::time::now_rfc3339();
        let (status, body) = match self {
            AppError::QuotaExceeded {
                message,
                quota,
                timestamp,
            } => {
                tracing::warn!("配额不可用: {message}");
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    ErrorBody {
                        status: false,
                        message,
                        quota: Some(quota),
                        timestamp,
                    },
                )
            }
            AppError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    status: false,
                    message,
                    quota: None,
                    timestamp,
                },
            ),
            AppError::NotFound(message) => (
                StatusCode::NOT_FOUND,
                ErrorBody {
                    status: false,
                    message,
                    quota: None,
                    timestamp,
                },
            ),
            // 内部错误只在服务端记录详情，不向调用方暴露。
            other => {
                tracing::error!(error = %other, "请求处理失败");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        status: false,
                        message: INTERNAL_ERROR_MESSAGE.to_string(),
                        quota: None,
                        timestamp,
                    },
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
