//! 运行状态：单任务执行权
//!
//! `running` 由 `current_task.is_some()` 推出，二者不可能不一致。
//! 只有协调协程持有可变引用，这就是唯一的互斥手段。

use crate::core::error::AgentError;
use crate::core::task::ResearchTask;

#[derive(Debug, Default)]
pub struct RunState {
    current_task: Option<ResearchTask>,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.current_task.is_some()
    }

    pub fn current_task(&self) -> Option<&ResearchTask> {
        self.current_task.as_ref()
    }

    /// 占用执行权（false → true）
    pub fn claim(&mut self, task: ResearchTask) -> Result<(), AgentError> {
        if let Some(current) = &self.current_task {
            return Err(AgentError::AlreadyRunning(current.name.clone()));
        }
        self.current_task = Some(task);
        Ok(())
    }

    /// 释放执行权（true → false），返回刚结束的任务
    pub fn release(&mut self) -> Option<ResearchTask> {
        self.current_task.take()
    }
}
