//! 任务队列：FIFO 待办列表
//!
//! 自身不带任何并发原语，只由调度协程修改；入队顺序即执行顺序。

use std::collections::VecDeque;

use crate::core::error::AgentError;
use crate::core::task::ResearchTask;

/// 待执行的研究任务（先进先出）
#[derive(Debug, Default)]
pub struct TaskQueue {
    pending: VecDeque<ResearchTask>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加到队尾，总是成功
    pub fn enqueue(&mut self, task: ResearchTask) {
        self.pending.push_back(task);
    }

    /// 取出最早入队的任务
    pub fn dequeue_front(&mut self) -> Result<ResearchTask, AgentError> {
        self.pending.pop_front().ok_or(AgentError::EmptyQueue)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// 按执行顺序列出待办任务名（"查看队列"）
    pub fn names(&self) -> Vec<String> {
        self.pending.iter().map(|t| t.name.clone()).collect()
    }
}
