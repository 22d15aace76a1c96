//! 调度：每个 tick 决定是否派发队首任务
//!
//! 每个周期至多做一次派发决定：派发后立即回到 Idle，不等待执行器完成，
//! 下一个任务由下一次 tick 推进。吞吐量受周期限制而不是任务时长。

use crate::core::queue::TaskQueue;
use crate::core::run_state::RunState;
use crate::core::session::Session;

/// 一次 tick 的决定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickDecision {
    /// 队列为空，什么都不做
    Empty,
    /// 已有任务在执行，什么都不做
    Busy,
    /// 有待办任务但会话未就绪：只触发会话打开，本周期不出队
    OpenSession,
    /// 出队并交给执行器
    Dispatch,
}

/// Idle → Dispatching 的守卫：队列非空且没有任务在执行，另需会话就绪
pub fn decide(queue: &TaskQueue, run_state: &RunState, session: &Session) -> TickDecision {
    if queue.is_empty() {
        TickDecision::Empty
    } else if run_state.is_running() {
        TickDecision::Busy
    } else if !session.is_ready() {
        TickDecision::OpenSession
    } else {
        TickDecision::Dispatch
    }
}
