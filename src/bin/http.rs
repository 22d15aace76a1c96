//! Research Bee HTTP 服务
//!
//! 在协调循环之外再提供一个 HTTP 控制面：
//! - POST /api/tasks        入队 {"name", "query", "output_target"}
//! - GET  /api/queue        待办任务名
//! - GET  /api/status       当前状态
//! - POST /api/session/open 提前打开浏览器会话
//!
//! 监听地址取自 [http].bind（默认 127.0.0.1:3002），可用 RBEE__HTTP__BIND 覆盖。
//!
//! 启动: cargo run --bin research-bee-http --features http

#[cfg(all(feature = "http", feature = "browser"))]
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    use std::path::PathBuf;
    use std::sync::Arc;

    use research_bee::browser::ChromeFactory;
    use research_bee::config::{load_config, AppConfig};
    use research_bee::core::{spawn_agent, ShutdownManager};
    use research_bee::integrations::http::create_router;

    research_bee::observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });

    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.install_signal_handlers();

    let factory = Arc::new(ChromeFactory::new(cfg.browser.clone()));
    let (handle, join) = spawn_agent(&cfg, factory, shutdown.token());

    let app = create_router(handle);
    let addr: std::net::SocketAddr = cfg.http.bind.parse()?;
    tracing::info!("Research Bee HTTP listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let token = shutdown.token();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await?;

    join.await?;
    Ok(())
}

#[cfg(not(all(feature = "http", feature = "browser")))]
fn main() {
    eprintln!("请使用 --features http 编译: cargo run --bin research-bee-http --features http");
    std::process::exit(1);
}
