//! Chrome 会话：使用 headless_chrome 通过 DevTools 协议驱动研究助手页面
//!
//! 需启用 feature "browser" 且系统已安装 Chrome/Chromium。
//! 两种方式：
//! - 启动新的 Chrome 实例（可见窗口，方便用户手动登录）
//! - 附着到已在运行、开了远程调试端口的 Chrome，复用其第一个标签页和登录态
//!
//! headless_chrome 是同步 API，所有调用都放进 `spawn_blocking`。

use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde_json::Value;

use crate::config::BrowserSection;
use crate::core::error::AgentError;
use crate::core::session::{ContentSurface, SurfaceFactory};

/// Chrome 在没有 DevTools 事件时会被 headless_chrome 判定为空闲并关闭；
/// 会话需要与进程同寿，所以放得足够长
const IDLE_BROWSER_TIMEOUT: Duration = Duration::from_secs(7 * 24 * 3600);

/// 已加载目标页面的标签页
pub struct ChromeSurface {
    // 持有 Browser，否则 Chrome 进程随之退出
    _browser: Browser,
    tab: Arc<Tab>,
}

#[async_trait]
impl ContentSurface for ChromeSurface {
    async fn evaluate(&self, script: &str) -> Result<Value, AgentError> {
        let tab = Arc::clone(&self.tab);
        let script = script.to_string();
        tokio::task::spawn_blocking(move || {
            let result = tab
                .evaluate(&script, true)
                .map_err(|e| AgentError::ActionSubmission(format!("Evaluate failed: {}", e)))?;
            Ok(result.value.unwrap_or(Value::Null))
        })
        .await
        .map_err(|e| AgentError::ActionSubmission(format!("Task join: {}", e)))?
    }

    async fn content(&self) -> Result<String, AgentError> {
        let tab = Arc::clone(&self.tab);
        tokio::task::spawn_blocking(move || {
            tab.get_content()
                .map_err(|e| AgentError::Export(format!("Get content failed: {}", e)))
        })
        .await
        .map_err(|e| AgentError::Export(format!("Task join: {}", e)))?
    }

    async fn screenshot(&self) -> Result<Vec<u8>, AgentError> {
        let tab = Arc::clone(&self.tab);
        tokio::task::spawn_blocking(move || {
            tab.capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)
                .map_err(|e| AgentError::Export(format!("Screenshot failed: {}", e)))
        })
        .await
        .map_err(|e| AgentError::Export(format!("Task join: {}", e)))?
    }
}

/// 按 [browser] 配置创建 ChromeSurface
pub struct ChromeFactory {
    settings: BrowserSection,
}

impl ChromeFactory {
    pub fn new(settings: BrowserSection) -> Self {
        Self { settings }
    }

    fn launch(settings: &BrowserSection) -> Result<Browser, AgentError> {
        let options = LaunchOptions::default_builder()
            .headless(settings.headless)
            .window_size(Some((settings.window_width, settings.window_height)))
            .path(settings.executable_path.clone())
            .args(vec![OsStr::new("--disable-blink-features=AutomationControlled")])
            .idle_browser_timeout(IDLE_BROWSER_TIMEOUT)
            .build()
            .map_err(|e| AgentError::SessionUnavailable(format!("Launch options: {}", e)))?;
        Browser::new(options).map_err(|e| {
            AgentError::SessionUnavailable(format!(
                "Chrome launch failed: {}. Install Chrome/Chromium.",
                e
            ))
        })
    }

    /// 附着模式下优先复用已有标签页
    fn pick_tab(browser: &Browser, reuse_existing: bool) -> Result<Arc<Tab>, AgentError> {
        if reuse_existing {
            let existing = browser
                .get_tabs()
                .lock()
                .map_err(|e| AgentError::SessionUnavailable(e.to_string()))?
                .first()
                .cloned();
            if let Some(tab) = existing {
                tracing::info!("reusing existing Chrome tab");
                return Ok(tab);
            }
        }
        browser
            .new_tab()
            .map_err(|e| AgentError::SessionUnavailable(format!("Browser tab failed: {}", e)))
    }

    fn open_blocking(settings: &BrowserSection, url: &str) -> Result<ChromeSurface, AgentError> {
        let (browser, attached) = match &settings.debugger_url {
            Some(ws_url) => {
                tracing::info!(ws_url = %ws_url, "attaching to running Chrome");
                let browser = Browser::connect_with_timeout(ws_url.clone(), IDLE_BROWSER_TIMEOUT)
                    .map_err(|e| AgentError::SessionUnavailable(format!("Chrome attach failed: {}", e)))?;
                (browser, true)
            }
            None => (Self::launch(settings)?, false),
        };

        let tab = Self::pick_tab(&browser, attached)?;
        tab.set_default_timeout(Duration::from_secs(settings.launch_timeout_secs.max(1)));
        tab.navigate_to(url)
            .map_err(|e| AgentError::SessionUnavailable(format!("Navigate failed: {}", e)))?;
        tab.wait_for_element("body")
            .map_err(|e| AgentError::SessionUnavailable(format!("Page load failed: {}", e)))?;

        Ok(ChromeSurface {
            _browser: browser,
            tab,
        })
    }
}

#[async_trait]
impl SurfaceFactory for ChromeFactory {
    async fn open(&self, url: &str) -> Result<Arc<dyn ContentSurface>, AgentError> {
        let settings = self.settings.clone();
        let url = url.to_string();
        let surface = tokio::task::spawn_blocking(move || Self::open_blocking(&settings, &url))
            .await
            .map_err(|e| AgentError::SessionUnavailable(format!("Task join: {}", e)))??;
        Ok(Arc::new(surface))
    }
}
