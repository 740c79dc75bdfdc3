use crate::error::AppError;
use crate::quota::{DEFAULT_COOLDOWN, MAX_COOLDOWN, UnconfiguredThinkingStatus};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 7860;
const DEFAULT_TIMEOUT_MS: u64 = 180_000;
const DEFAULT_CONFIG_PATH: &str = "conf/config.toml";
const DEFAULT_STATIC_DIR: &str = "frontend/out";
const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_EMBEDDING_CACHE_CAPACITY: u64 = 1024;
const DEFAULT_MULTI_QUERY_COUNT: usize = 3;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub timeout_ms: u64,

    pub debug: String,
    pub log_format: String,

    pub config_path: PathBuf,
    pub static_dir: PathBuf,
    pub utc_offset_minutes: i32,

    pub gemini_api_key: String,
    pub gemini_base_url: String,

    pub qdrant_url: String,
    pub qdrant_api_key: Option<String>,

    pub embedding_url: String,
    pub embedding_api_key: Option<String>,
    pub embedding_cache_capacity: u64,

    pub rag: RagConfig,
}

/// 配置文件中 `[rag]` 段：检索与生成链路的参数。
#[derive(Debug, Clone)]
pub struct RagConfig {
    pub embedding_model: String,
    pub collection: String,
    pub search_kwargs: BTreeMap<String, serde_json::Value>,
    pub system_prompt: String,
    pub primary_model: String,
    pub thinking_model: Option<String>,
    pub cooldown: Duration,
    pub multi_query_count: usize,
    pub thinking_budget: Option<i32>,
    pub unconfigured_thinking: UnconfiguredThinkingStatus,
}

#[derive(Debug, Default, Deserialize)]
struct RawEnv {
    #[serde(alias = "HOST")]
    host: Option<String>,
    #[serde(alias = "PORT")]
    port: Option<u16>,
    #[serde(alias = "TIMEOUT")]
    timeout: Option<u64>,

    #[serde(alias = "DEBUG")]
    debug: Option<String>,
    #[serde(alias = "LOG_FORMAT")]
    log_format: Option<String>,

    #[serde(alias = "CONFIG_PATH")]
    config_path: Option<String>,
    #[serde(alias = "STATIC_DIR")]
    static_dir: Option<String>,
    #[serde(alias = "UTC_OFFSET_MINUTES")]
    utc_offset_minutes: Option<i32>,

    #[serde(alias = "GEMINI_API_KEY")]
    gemini_api_key: Option<String>,
    #[serde(alias = "GEMINI_BASE_URL")]
    gemini_base_url: Option<String>,

    #[serde(alias = "QDRANT_URL")]
    qdrant_url: Option<String>,
    #[serde(alias = "QDRANT_API_KEY")]
    qdrant_api_key: Option<String>,

    #[serde(alias = "EMBEDDING_URL")]
    embedding_url: Option<String>,
    #[serde(alias = "EMBEDDING_API_KEY")]
    embedding_api_key: Option<String>,
    #[serde(alias = "EMBEDDING_CACHE_CAPACITY")]
    embedding_cache_capacity: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawFile {
    #[serde(default)]
    rag: RawRag,
}

#[derive(Debug, Default, Deserialize)]
struct RawRag {
    embedding: Option<String>,
    qdrant_collection: Option<String>,
    #[serde(default)]
    search_kwargs: BTreeMap<String, serde_json::Value>,
    system_prompt: Option<String>,
    llm: Option<String>,
    thinking_llm: Option<String>,
    cooldown_hours: Option<f64>,
    multi_query_count: Option<usize>,
    thinking_budget: Option<i32>,
    unconfigured_thinking_status: Option<UnconfiguredThinkingStatus>,
}

/// 命令行覆盖：--host / --port / --config / --debug [level]。
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct CliArgs {
    host: Option<String>,
    port: Option<u16>,
    config: Option<String>,
    debug: Option<String>,
}

impl CliArgs {
    fn parse(args: impl IntoIterator<Item = String>) -> Self {
        let mut out = Self::default();
        let mut args = args.into_iter().peekable();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--host" => out.host = args.next(),
                "--port" => out.port = args.next().and_then(|v| v.trim().parse().ok()),
                "--config" => out.config = args.next(),
                "--debug" | "-debug" => {
                    // 兼容无参数的 --debug：默认输出客户端 + 后端日志。
                    let level = match args.peek() {
                        Some(v) if !v.starts_with('-') => args.next(),
                        _ => None,
                    };
                    out.debug = Some(level.unwrap_or_else(|| "medium".to_string()));
                }
                _ => {}
            }
        }
        out
    }
}

impl Config {
    /// 启动时加载一次：.env → 环境变量 → 命令行 → 配置文件。
    ///
    /// 必填项缺失时直接返回错误，拒绝启动。
    pub fn load() -> Result<Self, AppError> {
        load_dotenv();

        let env = Figment::from(Env::raw())
            .extract::<RawEnv>()
            .map_err(|e| AppError::config(format!("环境变量解析失败: {e}")))?;
        let cli = CliArgs::parse(std::env::args().skip(1));

        let config_path = cli
            .config
            .clone()
            .or_else(|| env.config_path.clone())
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
        let config_path = PathBuf::from(config_path);
        let file = read_config_file(&config_path)?;

        Self::build(env, file, cli, config_path)
    }

    fn build(env: RawEnv, file: RawFile, cli: CliArgs, config_path: PathBuf) -> Result<Self, AppError> {
        let mut missing: Vec<&str> = Vec::new();
        let mut required = |value: Option<String>, name: &'static str| -> String {
            match non_empty(value) {
                Some(v) => v,
                None => {
                    missing.push(name);
                    String::new()
                }
            }
        };

        let raw = file.rag;
        let embedding_model = required(raw.embedding, "rag.embedding");
        let collection = required(raw.qdrant_collection, "rag.qdrant_collection");
        let system_prompt = required(raw.system_prompt, "rag.system_prompt");
        let primary_model = required(raw.llm, "rag.llm");
        let gemini_api_key = required(env.gemini_api_key, "GEMINI_API_KEY");
        let qdrant_url = required(env.qdrant_url, "QDRANT_URL");
        let embedding_url = required(env.embedding_url, "EMBEDDING_URL");

        if !missing.is_empty() {
            return Err(AppError::config(format!(
                "缺少必填配置: {}",
                missing.join(", ")
            )));
        }

        let cooldown = match raw.cooldown_hours {
            None => DEFAULT_COOLDOWN,
            Some(h) => parse_cooldown_hours(h)?,
        };

        let multi_query_count = raw.multi_query_count.unwrap_or(DEFAULT_MULTI_QUERY_COUNT);
        if multi_query_count == 0 {
            return Err(AppError::config("rag.multi_query_count 不能为 0"));
        }

        let rag = RagConfig {
            embedding_model,
            collection,
            search_kwargs: raw.search_kwargs,
            system_prompt,
            primary_model,
            thinking_model: non_empty(raw.thinking_llm),
            cooldown,
            multi_query_count,
            thinking_budget: raw.thinking_budget,
            unconfigured_thinking: raw.unconfigured_thinking_status.unwrap_or_default(),
        };

        Ok(Self {
            host: cli
                .host
                .or(env.host)
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: cli.port.or(env.port).unwrap_or(DEFAULT_PORT),
            timeout_ms: env.timeout.unwrap_or(DEFAULT_TIMEOUT_MS),
            debug: cli
                .debug
                .or(env.debug)
                .unwrap_or_else(|| "off".to_string()),
            log_format: env.log_format.unwrap_or_else(|| "text".to_string()),
            config_path,
            static_dir: PathBuf::from(
                env.static_dir
                    .unwrap_or_else(|| DEFAULT_STATIC_DIR.to_string()),
            ),
            utc_offset_minutes: env
                .utc_offset_minutes
                .unwrap_or(crate::util::time::DEFAULT_UTC_OFFSET_MINUTES),
            gemini_api_key,
            gemini_base_url: non_empty(env.gemini_base_url)
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
            qdrant_url,
            qdrant_api_key: non_empty(env.qdrant_api_key),
            embedding_url,
            embedding_api_key: non_empty(env.embedding_api_key),
            embedding_cache_capacity: env
                .embedding_cache_capacity
                .unwrap_or(DEFAULT_EMBEDDING_CACHE_CAPACITY),
            rag,
        })
    }

    pub fn log_level(&self) -> crate::logging::LogLevel {
        crate::logging::LogLevel::parse(&self.debug)
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}

/// 启动时尚未初始化日志，文件缺失直接作为错误返回。
fn read_config_file(path: &Path) -> Result<RawFile, AppError> {
    if !path.is_file() {
        return Err(AppError::config(format!(
            "配置文件不存在: {}",
            path.display()
        )));
    }
    Figment::from(Toml::file(path))
        .extract::<RawFile>()
        .map_err(|e| AppError::config(format!("解析配置文件 {} 失败: {e}", path.display())))
}

/// 冷却时长（小时）：必须为正，且不超过 `MAX_COOLDOWN`。
fn parse_cooldown_hours(hours: f64) -> Result<Duration, AppError> {
    let max_hours = MAX_COOLDOWN.as_secs_f64() / 3600.0;
    if !(hours.is_finite() && hours > 0.0 && hours <= max_hours) {
        return Err(AppError::config(format!(
            "rag.cooldown_hours 必须在 (0, {max_hours}] 范围内，当前为 {hours}"
        )));
    }
    Duration::try_from_secs_f64(hours * 3600.0)
        .map_err(|e| AppError::config(format!("rag.cooldown_hours 无效: {e}")))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn load_dotenv() {
    let Some(dotenv_path) = find_dotenv_path() else {
        return;
    };

    let Ok(file) = std::fs::File::open(&dotenv_path) else {
        return;
    };

    let reader = std::io::BufReader::new(file);
    for line in std::io::BufRead::lines(reader).map_while(Result::ok) {
        let Some((key, value)) = parse_dotenv_line(&line) else {
            continue;
        };
        // 已显式设置的环境变量优先于 .env。
        if std::env::var_os(&key).is_some() {
            continue;
        }
        // Rust 2024：修改进程环境变量为 unsafe。此处在启动阶段、
        // tokio 工作线程读取环境变量之前执行。
        unsafe {
            std::env::set_var(key, value);
        }
    }
}

fn find_dotenv_path() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    let mut dir: &Path = cwd.as_path();

    loop {
        let candidate = dir.join(".env");
        if candidate.is_file() {
            return Some(candidate);
        }

        // 不越过项目根目录。
        if dir.join("Cargo.toml").is_file() || dir.join(".git").is_dir() {
            return None;
        }

        let parent = dir.parent()?;
        if parent == dir {
            return None;
        }
        dir = parent;
    }
}

fn parse_dotenv_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let line = line.strip_prefix("export ").map(str::trim_start).unwrap_or(line);

    let (key, raw) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }

    let raw = raw.trim();
    for quote in ['"', '\''] {
        if raw.len() >= 2 && raw.starts_with(quote) && raw.ends_with(quote) {
            return Some((key.to_string(), raw[1..raw.len() - 1].to_string()));
        }
    }

    Some((key.to_string(), strip_inline_comment(raw).to_string()))
}

fn strip_inline_comment(value: &str) -> &str {
    let bytes = value.as_bytes();
    for i in 0..bytes.len() {
        if bytes[i] == b'#' && (i == 0 || bytes[i - 1] == b' ' || bytes[i - 1] == b'\t') {
            return value[..i].trim_end();
        }
    }
    value
}
