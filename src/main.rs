//! Research Bee - 单操作员研究自动化助手
//!
//! 入口：初始化日志、加载配置、启动协调循环，直到 Ctrl+C / SIGTERM。
//! 用法：research-bee [config.toml]

#[cfg(feature = "browser")]
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    use std::path::PathBuf;
    use std::sync::Arc;

    use anyhow::Context;
    use research_bee::browser::ChromeFactory;
    use research_bee::config::{load_config, AppConfig};
    use research_bee::core::{spawn_agent, ShutdownManager};

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

    let mut status_rx = handle.subscribe();
    tokio::spawn(async move {
        while status_rx.changed().await.is_ok() {
            let status = status_rx.borrow_and_update().to_string();
            tracing::info!(status = %status, "status");
        }
    });

    join.await.context("Agent loop panicked")?;
    Ok(())
}

#[cfg(not(feature = "browser"))]
fn main() {
    eprintln!("请使用 --features browser 编译: cargo run --features browser");
    std::process::exit(1);
}
