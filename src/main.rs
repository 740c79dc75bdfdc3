pub mod config;
pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod gemini;
pub mod logging;
pub mod quota;
pub mod rag;
pub mod retrieval;
pub mod util;

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::Config::load().context("加载配置失败")?;

    init_tracing(&cfg);
    util::time::init(cfg.utc_offset_minutes);
    tracing::info!("AskPESU 启动，配置文件: {}", cfg.config_path.display());

    let gemini = gemini::GeminiClient::new(&cfg).context("初始化 Gemini 客户端失败")?;
    let retriever: Arc<dyn retrieval::Retriever> = Arc::new(
        retrieval::VectorRetriever::from_config(&cfg).context("初始化检索服务失败")?,
    );

    let rag_cfg = &cfg.rag;
    let primary_model = Arc::new(gemini::GeminiModel::new(
        gemini.clone(),
        rag_cfg.primary_model.clone(),
    ));
    let primary = Arc::new(rag::GenerationPipeline::new(
        primary_model,
        retriever.clone(),
        rag_cfg.system_prompt.as_str(),
        rag_cfg.multi_query_count,
    ));

    // thinking 模型可选：缺省时 thinking 请求由 primary 处理。
    let thinking = rag_cfg.thinking_model.as_ref().map(|name| {
        let model = Arc::new(
            gemini::GeminiModel::new(gemini.clone(), name.clone())
                .with_thinking_budget(rag_cfg.thinking_budget),
        );
        Arc::new(rag::GenerationPipeline::new(
            model,
            retriever.clone(),
            rag_cfg.system_prompt.as_str(),
            rag_cfg.multi_query_count,
        ))
    });
    match &thinking {
        Some(p) => tracing::info!(
            "生成链路就绪: primary={}, thinking={}",
            primary.model_name(),
            p.model_name()
        ),
        None => tracing::info!(
            "生成链路就绪: primary={}，未配置 thinking 模型",
            primary.model_name()
        ),
    }

    let board = Arc::new(quota::QuotaBoard::new(
        rag_cfg.cooldown,
        thinking.is_some(),
        rag_cfg.unconfigured_thinking,
    ));
    tracing::info!(
        "配额冷却时长: {} 小时",
        board.primary().cooldown().num_minutes() as f64 / 60.0
    );
    let dispatcher = Arc::new(dispatch::Dispatcher::new(board, primary, thinking));

    let state = Arc::new(gateway::AppState {
        dispatcher,
        log_level: cfg.log_level(),
        static_dir: cfg.static_dir.clone(),
    });
    let app = gateway::router(state);

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], cfg.port)));

    tracing::info!("Server listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("绑定监听端口失败")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("服务异常退出")?;

    tracing::info!("AskPESU 已关闭");
    Ok(())
}

fn init_tracing(cfg: &config::Config) {
    // 依赖库日志默认 warn；本项目自身至少 info，避免外部 RUST_LOG=warn 把关键日志过滤掉。
    // DEBUG 只控制请求/响应日志块，不影响这里的过滤器。
    let env = std::env::var("RUST_LOG").unwrap_or_default();
    let env = env.trim();
    let filter = if env.is_empty() {
        EnvFilter::new("warn,askpesu=info")
    } else if env.contains("askpesu") {
        EnvFilter::new(env)
    } else {
        EnvFilter::new(format!("{env},askpesu=info"))
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true);

    let _ = if cfg.log_format.trim().eq_ignore_ascii_case("json") {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("收到退出信号，准备关闭服务...");
}
