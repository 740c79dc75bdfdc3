use serde::{Deserialize, Serialize};

/// 调用方提供的一轮历史对话。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub query: String,
    pub answer: String,
}

impl HistoryItem {
    pub fn new(query: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            answer: answer.into(),
        }
    }
}

/// 去掉与当前问题完全相同的历史轮次（逐字节比较，不做归一化）。
pub fn filter_history<'a>(history: &'a [HistoryItem], query: &str) -> Vec<&'a HistoryItem> {
    history.iter().filter(|item| item.query != query).collect()
}
