//! 状态上报：进程内唯一的状态文本，投影给外部 UI（菜单栏标签、HTTP 查询）
//!
//! 只有一个观察者槽位（watch 通道），不保留历史。

use serde::Serialize;
use tokio::sync::watch;

/// Agent 状态（Display 即状态栏文本）
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    SessionOpening,
    /// 会话已就绪，但页面提示需要登录
    LoginRequired,
    Running { task: String },
    SessionUnavailable { reason: String },
    Failed { task: String, reason: String },
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentStatus::Idle => write!(f, "idle"),
            AgentStatus::SessionOpening => write!(f, "session opening"),
            AgentStatus::LoginRequired => write!(f, "session ready, login required"),
            AgentStatus::Running { task } => write!(f, "running: {}", task),
            AgentStatus::SessionUnavailable { reason } => {
                write!(f, "session unavailable: {}", reason)
            }
            AgentStatus::Failed { task, reason } => write!(f, "failed: {}: {}", task, reason),
        }
    }
}

pub struct StatusReporter {
    tx: watch::Sender<AgentStatus>,
}

impl StatusReporter {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(AgentStatus::Idle);
        Self { tx }
    }

    /// 覆盖当前状态并通知观察者
    pub fn set_status(&self, status: AgentStatus) {
        tracing::debug!(status = %status, "status changed");
        self.tx.send_replace(status);
    }

    pub fn get_status(&self) -> String {
        self.tx.borrow().to_string()
    }

    /// 观察者槽位
    pub fn subscribe(&self) -> watch::Receiver<AgentStatus> {
        self.tx.subscribe()
    }
}

impl Default for StatusReporter {
    fn default() -> Self {
        Self::new()
    }
}
