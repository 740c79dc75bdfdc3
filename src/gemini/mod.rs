//! Gemini 公共 API（generativelanguage.googleapis.com）的最小客户端。

pub mod client;
pub mod model;
pub mod types;

pub use client::{ApiError, GeminiClient};
pub use model::GeminiModel;
