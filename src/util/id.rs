use uuid::Uuid;

/// 单次 /ask 请求的关联 ID，用于串联同一请求在各步骤中的日志。
pub fn request_id() -> String {
    let s = Uuid::new_v4().simple().to_string();
    format!("ask-{}", &s[..s.len().min(12)])
}
