//! 会话：进程内唯一、可复用的交互式内容界面（一个浏览器标签页）
//!
//! 首次需要时惰性创建，之后每个任务都复用；核心从不销毁它，
//! 以保留用户手动建立的登录状态。阶段用带标签的枚举表示，
//! 只有 Ready 才携带句柄，因此不可能对一个仍在加载的会话下手。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::browser::script::{parse_probe, PROBE_SCRIPT};
use crate::core::error::AgentError;
use crate::core::event::AgentEvent;
use crate::core::executor::contains_any;

/// 会话背后的内容界面：执行脚本、读取页面
#[async_trait]
pub trait ContentSurface: Send + Sync {
    /// 在页面中执行一段脚本，返回其结果值
    async fn evaluate(&self, script: &str) -> Result<Value, AgentError>;

    /// 当前页面的完整 HTML
    async fn content(&self) -> Result<String, AgentError>;

    /// 当前页面截图（PNG）
    async fn screenshot(&self) -> Result<Vec<u8>, AgentError>;
}

/// 创建内容界面并加载目标地址；每个进程只会被调用一次
#[async_trait]
pub trait SurfaceFactory: Send + Sync {
    async fn open(&self, url: &str) -> Result<Arc<dyn ContentSurface>, AgentError>;
}

/// 会话阶段
#[derive(Clone)]
pub enum SessionPhase {
    Uninitialized,
    Opening,
    Ready(Arc<dyn ContentSurface>),
}

impl std::fmt::Debug for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionPhase::Uninitialized => write!(f, "Uninitialized"),
            SessionPhase::Opening => write!(f, "Opening"),
            SessionPhase::Ready(_) => write!(f, "Ready"),
        }
    }
}

pub struct Session {
    phase: SessionPhase,
    factory: Arc<dyn SurfaceFactory>,
    target_url: String,
    login_markers: Vec<String>,
}

impl Session {
    pub fn new(factory: Arc<dyn SurfaceFactory>, target_url: impl Into<String>) -> Self {
        Self {
            phase: SessionPhase::Uninitialized,
            factory,
            target_url: target_url.into(),
            login_markers: Vec::new(),
        }
    }

    /// 加载完成后检查这些文本，命中则回送 `AgentEvent::LoginRequired`
    pub fn with_login_markers(mut self, markers: Vec<String>) -> Self {
        self.login_markers = markers;
        self
    }

    /// Uninitialized 时转入 Opening 并在后台打开界面，加载完成后回送
    /// `AgentEvent::SessionOpened`；Opening / Ready 时什么都不做。
    ///
    /// 返回本次调用是否真正发起了打开。
    pub fn ensure_ready(&mut self, events: &mpsc::UnboundedSender<AgentEvent>) -> bool {
        if !matches!(self.phase, SessionPhase::Uninitialized) {
            return false;
        }
        self.phase = SessionPhase::Opening;

        let factory = Arc::clone(&self.factory);
        let url = self.target_url.clone();
        let login_markers = self.login_markers.clone();
        let events = events.clone();
        tracing::info!(url = %url, "opening research session");
        tokio::spawn(async move {
            let result = factory.open(&url).await;
            let surface = result.as_ref().ok().cloned();
            let _ = events.send(AgentEvent::SessionOpened(result));
            if let Some(surface) = surface {
                if needs_login(surface.as_ref(), &login_markers).await {
                    let _ = events.send(AgentEvent::LoginRequired);
                }
            }
        });
        true
    }

    /// 加载完成信号：成功则进入 Ready；失败则停在 Opening，不再重试
    pub fn on_opened(
        &mut self,
        result: Result<Arc<dyn ContentSurface>, AgentError>,
    ) -> Result<(), AgentError> {
        if !matches!(self.phase, SessionPhase::Opening) {
            tracing::warn!(phase = ?self.phase, "unexpected session load signal ignored");
            return Ok(());
        }
        match result {
            Ok(surface) => {
                self.phase = SessionPhase::Ready(surface);
                tracing::info!(url = %self.target_url, "research session ready");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "research session could not be created");
                Err(match e {
                    AgentError::SessionUnavailable(_) => e,
                    other => AgentError::SessionUnavailable(other.to_string()),
                })
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.phase, SessionPhase::Ready(_))
    }

    pub fn phase(&self) -> &SessionPhase {
        &self.phase
    }

    /// Ready 时返回界面句柄
    pub fn surface(&self) -> Result<Arc<dyn ContentSurface>, AgentError> {
        match &self.phase {
            SessionPhase::Ready(surface) => Ok(Arc::clone(surface)),
            _ => Err(AgentError::SessionNotReady),
        }
    }
}

/// 页面文本里出现登录提示即视为未登录；读取失败时不下结论
async fn needs_login(surface: &dyn ContentSurface, markers: &[String]) -> bool {
    if markers.is_empty() {
        return false;
    }
    match surface.evaluate(PROBE_SCRIPT).await.and_then(|v| parse_probe(&v)) {
        Ok(text) if contains_any(&text, markers) => {
            tracing::warn!("login prompt detected, sign in manually in the browser window");
            true
        }
        Ok(_) => {
            tracing::info!("logged-in session detected");
            false
        }
        Err(e) => {
            tracing::debug!(error = %e, "login check skipped");
            false
        }
    }
}
