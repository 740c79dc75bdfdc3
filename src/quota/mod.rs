//! 模型配额状态机。
//!
//! 每个后端模型（primary / thinking）各有一份进程级的 `QuotaState`：
//! 上游报告资源耗尽时进入冷却，冷却期满后在下一次请求时惰性恢复，
//! 无需后台定时任务。

mod board;
mod state;

pub use board::{QuotaBoard, QuotaSnapshot, UnconfiguredThinkingStatus};
pub use state::{DEFAULT_COOLDOWN, MAX_COOLDOWN, QuotaState, QuotaStatus};
