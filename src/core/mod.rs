//! 核心调度层：任务队列、会话、执行器、调度 tick、状态上报与协调循环

pub mod agent;
pub mod error;
pub mod event;
pub mod executor;
pub mod queue;
pub mod run_state;
pub mod scheduler;
pub mod session;
pub mod shutdown;
pub mod status;
pub mod task;

pub use agent::{spawn_agent, Agent, AgentHandle};
pub use error::AgentError;
pub use event::{AgentEvent, Command};
pub use executor::TaskExecutor;
pub use queue::TaskQueue;
pub use run_state::RunState;
pub use scheduler::{decide, TickDecision};
pub use session::{ContentSurface, Session, SessionPhase, SurfaceFactory};
pub use shutdown::{ShutdownManager, ShutdownReason};
pub use status::{AgentStatus, StatusReporter};
pub use task::ResearchTask;
