//! Agent 协调循环
//!
//! 唯一的协调协程持有队列、运行状态、会话与状态上报，通过 `tokio::select!` 接收三类输入：
//! - 周期 tick（默认 60 秒；启动延迟后立即先触发一次）
//! - 内部事件（会话加载完成、任务结束），来自派生任务
//! - 外部命令（入队、打开会话、查看队列、退出）
//!
//! 所有状态修改都发生在这个协程里，因此无需加锁即可保证同一时刻至多一个任务在执行。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::core::error::AgentError;
use crate::core::event::{AgentEvent, Command};
use crate::core::executor::TaskExecutor;
use crate::core::queue::TaskQueue;
use crate::core::run_state::RunState;
use crate::core::scheduler::{decide, TickDecision};
use crate::core::session::{Session, SurfaceFactory};
use crate::core::status::{AgentStatus, StatusReporter};
use crate::core::task::ResearchTask;

pub struct Agent {
    queue: TaskQueue,
    run_state: RunState,
    session: Session,
    status: StatusReporter,
    executor: TaskExecutor,
    poll_interval: Duration,
    startup_delay: Duration,
    events_tx: mpsc::UnboundedSender<AgentEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<AgentEvent>>,
}

impl Agent {
    /// 按配置组装；`[[tasks]]` 中的任务按顺序入队
    pub fn new(cfg: &AppConfig, factory: Arc<dyn SurfaceFactory>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut agent = Self {
            queue: TaskQueue::new(),
            run_state: RunState::new(),
            session: Session::new(factory, cfg.agent.target_url.clone())
                .with_login_markers(cfg.agent.login_markers.clone()),
            status: StatusReporter::new(),
            executor: TaskExecutor::new(cfg.executor.clone()),
            poll_interval: cfg.agent.poll_interval(),
            startup_delay: cfg.agent.startup_delay(),
            events_tx,
            events_rx: Some(events_rx),
        };
        for task in &cfg.tasks {
            agent.enqueue(task.clone());
        }
        agent
    }

    pub fn enqueue(&mut self, task: ResearchTask) {
        tracing::info!(task = %task.name, queued = self.queue.len() + 1, "task enqueued");
        self.queue.enqueue(task);
    }

    /// 打开会话（幂等）；真正发起时状态切到 `session opening`
    pub fn ensure_session(&mut self) {
        if self.session.ensure_ready(&self.events_tx) && !self.run_state.is_running() {
            self.status.set_status(AgentStatus::SessionOpening);
        }
    }

    /// 一次调度 tick
    pub fn tick(&mut self) -> TickDecision {
        let decision = decide(&self.queue, &self.run_state, &self.session);
        match decision {
            TickDecision::Empty | TickDecision::Busy => {
                tracing::debug!(decision = ?decision, queued = self.queue.len(), "tick skipped");
            }
            TickDecision::OpenSession => self.ensure_session(),
            TickDecision::Dispatch => {
                if let Err(e) = self.dispatch() {
                    if e.is_contract_violation() {
                        tracing::error!(error = %e, "scheduler invariant breached, tick skipped");
                    } else {
                        tracing::error!(error = %e, "dispatch aborted");
                    }
                }
            }
        }
        decision
    }

    /// 先确认执行条件再出队，契约违背时任务留在队首
    fn dispatch(&mut self) -> Result<(), AgentError> {
        if let Some(current) = self.run_state.current_task() {
            return Err(AgentError::AlreadyRunning(current.name.clone()));
        }
        if !self.session.is_ready() {
            return Err(AgentError::SessionNotReady);
        }
        let task = self.queue.dequeue_front()?;
        self.executor.run(
            task,
            &self.session,
            &mut self.run_state,
            &self.status,
            &self.events_tx,
        )
    }

    /// 等待下一个内部事件（`run` 启动后由循环独占，返回 None）
    pub async fn next_event(&mut self) -> Option<AgentEvent> {
        match self.events_rx.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    pub fn handle_event(&mut self, event: AgentEvent) {
        match event {
            AgentEvent::SessionOpened(result) => match self.session.on_opened(result) {
                Ok(()) => {
                    if !self.run_state.is_running() {
                        self.status.set_status(AgentStatus::Idle);
                    }
                }
                Err(e) => {
                    let reason = match e {
                        AgentError::SessionUnavailable(reason) => reason,
                        other => other.to_string(),
                    };
                    self.status
                        .set_status(AgentStatus::SessionUnavailable { reason });
                }
            },
            AgentEvent::LoginRequired => {
                if !self.run_state.is_running() {
                    self.status.set_status(AgentStatus::LoginRequired);
                }
            }
            AgentEvent::TaskFinished { task, outcome } => {
                self.executor
                    .finish(&task, outcome, &mut self.run_state, &self.status);
            }
        }
    }

    /// 处理外部命令；返回 false 表示应退出循环
    pub fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Enqueue(task) => self.enqueue(task),
            Command::OpenSession => self.ensure_session(),
            Command::ListQueue(reply) => {
                let _ = reply.send(self.queue.names());
            }
            Command::Quit => return false,
        }
        true
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    pub fn run_state(&self) -> &RunState {
        &self.run_state
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn status(&self) -> &StatusReporter {
        &self.status
    }

    /// 主循环：启动延迟后打开会话并开始周期 tick，直到收到 Quit 或关闭信号
    pub async fn run(
        mut self,
        mut cmd_rx: mpsc::UnboundedReceiver<Command>,
        shutdown: CancellationToken,
    ) {
        let Some(mut events_rx) = self.events_rx.take() else {
            tracing::error!("agent event receiver already taken");
            return;
        };

        let startup = tokio::time::sleep(self.startup_delay);
        tokio::pin!(startup);
        let mut started = false;

        let mut ticker =
            tokio::time::interval_at(Instant::now() + self.startup_delay, self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            poll_secs = self.poll_interval.as_secs(),
            queued = self.queue.len(),
            "research agent started"
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = &mut startup, if !started => {
                    started = true;
                    self.ensure_session();
                }
                Some(event) = events_rx.recv() => self.handle_event(event),
                Some(command) = cmd_rx.recv() => {
                    if !self.handle_command(command) {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.tick();
                }
            }
        }

        if let Some(task) = self.run_state.current_task() {
            tracing::warn!(task = %task.name, "exiting with a task in flight");
        }
        tracing::info!(queued = self.queue.len(), "research agent stopped");
    }
}

/// 外部协作方持有的句柄：发送命令、读取状态
#[derive(Clone)]
pub struct AgentHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
    status_rx: watch::Receiver<AgentStatus>,
}

impl AgentHandle {
    fn send(&self, command: Command) -> Result<(), AgentError> {
        self.cmd_tx.send(command).map_err(|_| AgentError::Stopped)
    }

    pub fn enqueue(&self, task: ResearchTask) -> Result<(), AgentError> {
        self.send(Command::Enqueue(task))
    }

    pub fn open_session(&self) -> Result<(), AgentError> {
        self.send(Command::OpenSession)
    }

    pub fn quit(&self) -> Result<(), AgentError> {
        self.send(Command::Quit)
    }

    pub async fn list_queue(&self) -> Result<Vec<String>, AgentError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::ListQueue(tx))?;
        rx.await.map_err(|_| AgentError::Stopped)
    }

    /// 当前状态文本
    pub fn status(&self) -> String {
        self.status_rx.borrow().to_string()
    }

    pub fn subscribe(&self) -> watch::Receiver<AgentStatus> {
        self.status_rx.clone()
    }
}

/// 创建 Agent 并在后台运行协调循环
pub fn spawn_agent(
    cfg: &AppConfig,
    factory: Arc<dyn SurfaceFactory>,
    shutdown: CancellationToken,
) -> (AgentHandle, JoinHandle<()>) {
    let agent = Agent::new(cfg, factory);
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let handle = AgentHandle {
        cmd_tx,
        status_rx: agent.status().subscribe(),
    };
    let join = tokio::spawn(agent.run(cmd_rx, shutdown));
    (handle, join)
}
