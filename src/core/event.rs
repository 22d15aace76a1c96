//! 协调协程的内部事件与外部命令
//!
//! 所有挂起的工作（打开浏览器、提交脚本、等待完成）都在派生任务中进行，
//! 结束时各自回送一个 AgentEvent；只有协调协程修改状态。

use std::sync::Arc;

use tokio::sync::oneshot;

use crate::core::error::AgentError;
use crate::core::session::ContentSurface;
use crate::core::task::ResearchTask;

/// 派生任务回送给协调协程的事件
pub enum AgentEvent {
    /// 会话的页面加载完成（或失败）
    SessionOpened(Result<Arc<dyn ContentSurface>, AgentError>),
    /// 页面已加载但仍停在登录页，需要用户手动登录
    LoginRequired,
    /// 一个任务执行结束：成功返回导出路径（可能为空），失败返回原因
    TaskFinished {
        task: ResearchTask,
        outcome: Result<Option<String>, AgentError>,
    },
}

impl std::fmt::Debug for AgentEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentEvent::SessionOpened(Ok(_)) => write!(f, "SessionOpened(Ok)"),
            AgentEvent::SessionOpened(Err(e)) => write!(f, "SessionOpened(Err({}))", e),
            AgentEvent::LoginRequired => write!(f, "LoginRequired"),
            AgentEvent::TaskFinished { task, outcome } => f
                .debug_struct("TaskFinished")
                .field("task", &task.name)
                .field("outcome", outcome)
                .finish(),
        }
    }
}

/// 外部（HTTP、启动脚本等）发往协调协程的命令
#[derive(Debug)]
pub enum Command {
    /// 追加一个研究任务（"执行 Deep Research"）
    Enqueue(ResearchTask),
    /// 确保会话已打开（"启动浏览器"）
    OpenSession,
    /// 查看待办任务名（"查看队列"）
    ListQueue(oneshot::Sender<Vec<String>>),
    /// 退出协调循环
    Quit,
}
