//! Agent 错误类型
//!
//! 三类错误的处理方式不同：
//! - 契约违背（EmptyQueue / SessionNotReady / AlreadyRunning）：记录日志并结束本次 tick
//! - 任务级错误（ActionSubmission / CompletionTimeout / Export）：释放执行权，丢弃任务，不重试
//! - 会话不可用（SessionUnavailable）：状态栏持续显示，进程不退出

use thiserror::Error;

/// 调度与执行过程中可能出现的错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgentError {
    #[error("Task queue is empty")]
    EmptyQueue,

    #[error("Session is not ready")]
    SessionNotReady,

    /// 已有任务在执行时再次尝试占用执行权
    #[error("Another task is already running: {0}")]
    AlreadyRunning(String),

    #[error("Action submission failed: {0}")]
    ActionSubmission(String),

    #[error("Completion not observed within {0}s")]
    CompletionTimeout(u64),

    #[error("Session unavailable: {0}")]
    SessionUnavailable(String),

    #[error("Export failed: {0}")]
    Export(String),

    /// 协调循环已退出，命令无法送达
    #[error("Agent loop has stopped")]
    Stopped,
}

impl AgentError {
    /// 是否属于调度器自身的契约违背（只应记录日志并跳过本次 tick）
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            AgentError::EmptyQueue | AgentError::SessionNotReady | AgentError::AlreadyRunning(_)
        )
    }
}
