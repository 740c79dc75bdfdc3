use std::time::Duration;

/// 请求/响应日志等级：
/// - off：不输出请求响应块（应用日志仍按 RUST_LOG 输出）
/// - low：输出客户端请求/响应（格式化）
/// - medium：输出客户端 + 后端（Gemini）请求/响应（格式化）
/// - high：同 medium，但完全原始输出，不解析不格式化
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Off = 0,
    Low = 1,
    Medium = 2,
    High = 3,
}

impl LogLevel {
    pub fn parse(debug: &str) -> Self {
        match debug.trim().to_lowercase().as_str() {
            "low" | "client" => Self::Low,
            "medium" | "backend" | "true" | "1" => Self::Medium,
            "high" | "all" | "raw" => Self::High,
            _ => Self::Off,
        }
    }

    pub fn client_enabled(self) -> bool {
        self >= Self::Low
    }

    pub fn backend_enabled(self) -> bool {
        self >= Self::Medium
    }

    pub fn raw_enabled(self) -> bool {
        self >= Self::High
    }
}

pub fn format_duration_ms(d: Duration) -> i64 {
    d.as_millis().min(i64::MAX as u128) as i64
}

/// 按等级输出客户端请求块。
pub fn client_request(level: LogLevel, method: &str, path: &str, body: &[u8]) {
    if !level.client_enabled() {
        return;
    }
    let body = if level.raw_enabled() {
        format_bytes_raw(body)
    } else {
        format_body_bytes(body)
    };
    tracing::info!(
        "\n===================== 客户端请求 ======================\n[客户端请求] {method} {path}\n{body}\n========================================================="
    );
}

pub fn client_response(level: LogLevel, status: u16, duration: Duration, body: &[u8]) {
    if !level.client_enabled() {
        return;
    }
    let body = if level.raw_enabled() {
        format_bytes_raw(body)
    } else {
        format_body_bytes(body)
    };
    tracing::info!(
        "\n===================== 客户端响应 ======================\n[客户端响应] {} {}ms\n{}\n==========================================================",
        status,
        format_duration_ms(duration),
        body
    );
}

/// 后端请求块。url 中不得包含密钥（Gemini 的 key 放在请求头里）。
pub fn backend_request(level: LogLevel, method: &str, url: &str, body: &[u8]) {
    if !level.backend_enabled() {
        return;
    }
    let body = if level.raw_enabled() {
        format_bytes_raw(body)
    } else {
        format_body_bytes(body)
    };
    tracing::info!(
        "\n====================== 后端请求 ========================\n[后端请求] {method} {url}\n{body}\n=========================================================="
    );
}

pub fn backend_response(level: LogLevel, status: u16, duration: Duration, body: &[u8]) {
    if !level.backend_enabled() {
        return;
    }
    let body = if level.raw_enabled() {
        format_bytes_raw(body)
    } else {
        format_body_bytes(body)
    };
    tracing::info!(
        "\n====================== 后端响应 ========================\n[后端响应] {} {}ms\n{}\n==========================================================",
        status,
        format_duration_ms(duration),
        body
    );
}

fn format_body_bytes(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return String::new();
    }

    // 极端大包：避免为了日志反序列化/格式化而产生额外开销。
    const MAX_PARSE_BYTES: usize = 2 * 1024 * 1024;
    if bytes.len() > MAX_PARSE_BYTES {
        return format!(
            "(body too large: {} bytes)\n{}",
            bytes.len(),
            truncate_text_for_log(&String::from_utf8_lossy(&bytes[..MAX_PARSE_BYTES]))
        );
    }

    match sonic_rs::from_slice::<sonic_rs::Value>(bytes) {
        Ok(v) => match sonic_rs::to_string_pretty(&v) {
            Ok(s) => truncate_text_for_log(&s),
            Err(_) => truncate_text_for_log(&v.to_string()),
        },
        Err(_) => truncate_text_for_log(&String::from_utf8_lossy(bytes)),
    }
}

fn format_bytes_raw(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

pub fn truncate_text_for_log(s: &str) -> String {
    const MAX_CHARS: usize = 32 * 1024;
    match s.char_indices().nth(MAX_CHARS) {
        None => s.to_string(),
        Some((idx, _)) => format!("{}...[TRUNCATED]", &s[..idx]),
    }
}
