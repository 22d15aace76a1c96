//! 调度与执行的端到端场景（模拟浏览器会话）

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use research_bee::config::{AppConfig, CompletionSection};
use research_bee::core::{
    Agent, AgentError, AgentEvent, ContentSurface, ResearchTask, SurfaceFactory, TickDecision,
};
use serde_json::Value;

/// 记录提交过的问题；问题里带 "broken" 时模拟找不到输入框
#[derive(Default)]
struct MockSurface {
    submitted: Mutex<Vec<String>>,
    probes: AtomicUsize,
    /// 第几次探测开始出现完成标记（0 表示永不完成）
    done_after_probes: usize,
    /// 上一轮留在页面上的文本，每次探测都会带上
    earlier_answer: &'static str,
}

impl MockSurface {
    fn submitted(&self) -> Vec<String> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContentSurface for MockSurface {
    async fn evaluate(&self, script: &str) -> Result<Value, AgentError> {
        if script.contains("innerText") && !script.contains("contenteditable") {
            let n = self.probes.fetch_add(1, Ordering::SeqCst) + 1;
            let current = if self.done_after_probes > 0 && n >= self.done_after_probes {
                "Deep Research completed"
            } else {
                "正在研究 Researching..."
            };
            let text = format!("{}{}", self.earlier_answer, current);
            return Ok(Value::String(serde_json::json!({ "text": text }).to_string()));
        }

        self.submitted.lock().unwrap().push(script.to_string());
        if script.contains("broken") {
            return Ok(Value::String(r#"{"ok":false,"reason":"input not found"}"#.into()));
        }
        Ok(Value::String(r#"{"ok":true,"deep_research":true}"#.into()))
    }

    async fn content(&self) -> Result<String, AgentError> {
        Ok("<html><body><p>Markets closed higher</p></body></html>".to_string())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, AgentError> {
        Ok(b"\x89PNG".to_vec())
    }
}

struct MockFactory {
    surface: Arc<MockSurface>,
    opened: AtomicUsize,
}

impl MockFactory {
    fn new(surface: MockSurface) -> Arc<Self> {
        Arc::new(Self {
            surface: Arc::new(surface),
            opened: AtomicUsize::new(0),
        })
    }

    fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SurfaceFactory for MockFactory {
    async fn open(&self, _url: &str) -> Result<Arc<dyn ContentSurface>, AgentError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(self.surface.clone())
    }
}

struct FailingFactory;

#[async_trait]
impl SurfaceFactory for FailingFactory {
    async fn open(&self, _url: &str) -> Result<Arc<dyn ContentSurface>, AgentError> {
        Err(AgentError::SessionUnavailable("Chrome launch failed".into()))
    }
}

fn test_config() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.agent.startup_delay_secs = 0;
    cfg.agent.poll_interval_secs = 1;
    cfg.agent.login_markers = Vec::new();
    cfg.executor.completion = CompletionSection::Simulated { delay_secs: 0 };
    cfg
}

fn task(name: &str, query: &str) -> ResearchTask {
    ResearchTask::new(name, query, "")
}

async fn next_event(agent: &mut Agent) -> AgentEvent {
    tokio::time::timeout(Duration::from_secs(5), agent.next_event())
        .await
        .expect("event within 5s")
        .expect("event channel open")
}

/// 打开会话并处理加载完成事件
async fn make_ready(agent: &mut Agent) {
    agent.ensure_session();
    let event = next_event(agent).await;
    assert!(matches!(event, AgentEvent::SessionOpened(Ok(_))));
    agent.handle_event(event);
    assert!(agent.session().is_ready());
}

#[tokio::test]
async fn test_scenario_a_lazy_session_then_dispatch() {
    let factory = MockFactory::new(MockSurface::default());
    let mut agent = Agent::new(&test_config(), factory.clone());
    agent.enqueue(task("morning-brief", "generate market brief for 2026-02-11"));

    assert_eq!(agent.tick(), TickDecision::OpenSession);
    assert_eq!(agent.queue().len(), 1);
    assert!(!agent.run_state().is_running());
    assert_eq!(agent.status().get_status(), "session opening");

    let event = next_event(&mut agent).await;
    agent.handle_event(event);
    assert!(agent.session().is_ready());
    assert_eq!(agent.status().get_status(), "idle");

    assert_eq!(agent.tick(), TickDecision::Dispatch);
    assert!(agent.run_state().is_running());
    assert_eq!(
        agent.run_state().current_task().unwrap().name,
        "morning-brief"
    );
    assert_eq!(agent.status().get_status(), "running: morning-brief");
    assert!(agent.queue().is_empty());

    let event = next_event(&mut agent).await;
    assert!(matches!(event, AgentEvent::TaskFinished { .. }));
    agent.handle_event(event);
    assert!(!agent.run_state().is_running());
    assert_eq!(agent.status().get_status(), "idle");
    assert!(agent.queue().is_empty());

    let submitted = factory.surface.submitted();
    assert_eq!(submitted.len(), 1);
    assert!(submitted[0].contains("generate market brief for 2026-02-11"));
    assert_eq!(factory.opened(), 1);
}

#[tokio::test]
async fn test_scenario_b_one_task_in_flight() {
    let factory = MockFactory::new(MockSurface::default());
    let mut agent = Agent::new(&test_config(), factory.clone());
    make_ready(&mut agent).await;

    agent.enqueue(task("T1", "first question"));
    agent.enqueue(task("T2", "second question"));

    assert_eq!(agent.tick(), TickDecision::Dispatch);
    assert_eq!(agent.run_state().current_task().unwrap().name, "T1");
    assert_eq!(agent.queue().names(), vec!["T2"]);

    // T1 仍在执行：tick 不出队
    assert_eq!(agent.tick(), TickDecision::Busy);
    assert_eq!(agent.queue().len(), 1);
    assert_eq!(agent.run_state().current_task().unwrap().name, "T1");

    let event = next_event(&mut agent).await;
    agent.handle_event(event);
    assert!(!agent.run_state().is_running());

    assert_eq!(agent.tick(), TickDecision::Dispatch);
    assert_eq!(agent.run_state().current_task().unwrap().name, "T2");
    let event = next_event(&mut agent).await;
    agent.handle_event(event);

    let submitted = factory.surface.submitted();
    assert_eq!(submitted.len(), 2);
    assert!(submitted[0].contains("first question"));
    assert!(submitted[1].contains("second question"));
}

#[tokio::test]
async fn test_scenario_c_failed_submission_is_dropped() {
    let factory = MockFactory::new(MockSurface::default());
    let mut agent = Agent::new(&test_config(), factory.clone());
    make_ready(&mut agent).await;

    agent.enqueue(task("T1", "broken page"));
    agent.enqueue(task("T2", "healthy question"));

    assert_eq!(agent.tick(), TickDecision::Dispatch);
    let event = next_event(&mut agent).await;
    match &event {
        AgentEvent::TaskFinished { task, outcome } => {
            assert_eq!(task.name, "T1");
            assert_eq!(
                outcome,
                &Err(AgentError::ActionSubmission("input not found".into()))
            );
        }
        other => panic!("unexpected event {:?}", other),
    }
    agent.handle_event(event);
    assert!(!agent.run_state().is_running());
    assert_eq!(
        agent.status().get_status(),
        "failed: T1: Action submission failed: input not found"
    );
    assert_eq!(agent.queue().names(), vec!["T2"]);

    assert_eq!(agent.tick(), TickDecision::Dispatch);
    assert_eq!(agent.run_state().current_task().unwrap().name, "T2");
    let event = next_event(&mut agent).await;
    agent.handle_event(event);
    assert_eq!(agent.status().get_status(), "idle");

    // T1 没有被重试
    let submitted = factory.surface.submitted();
    assert_eq!(submitted.len(), 2);
    assert_eq!(submitted.iter().filter(|s| s.contains("broken page")).count(), 1);
    assert!(agent.queue().is_empty());
}

#[tokio::test]
async fn test_empty_queue_tick_is_noop() {
    let factory = MockFactory::new(MockSurface::default());
    let mut agent = Agent::new(&test_config(), factory.clone());

    for _ in 0..3 {
        assert_eq!(agent.tick(), TickDecision::Empty);
    }
    assert!(!agent.run_state().is_running());
    assert_eq!(agent.status().get_status(), "idle");
    // 空队列不会触发会话创建
    tokio::task::yield_now().await;
    assert_eq!(factory.opened(), 0);

    make_ready(&mut agent).await;
    assert_eq!(agent.tick(), TickDecision::Empty);
    assert!(factory.surface.submitted().is_empty());
}

#[tokio::test]
async fn test_session_created_once() {
    let factory = MockFactory::new(MockSurface::default());
    let mut agent = Agent::new(&test_config(), factory.clone());
    agent.enqueue(task("T1", "q"));

    agent.ensure_session();
    assert_eq!(agent.tick(), TickDecision::OpenSession);
    agent.ensure_session();
    assert_eq!(agent.tick(), TickDecision::OpenSession);

    let event = next_event(&mut agent).await;
    agent.handle_event(event);
    agent.ensure_session();

    assert_eq!(agent.tick(), TickDecision::Dispatch);
    let event = next_event(&mut agent).await;
    agent.handle_event(event);
    assert_eq!(factory.opened(), 1);
}

#[tokio::test]
async fn test_session_unavailable_is_persistent() {
    let mut agent = Agent::new(&test_config(), Arc::new(FailingFactory));
    agent.enqueue(task("T1", "q"));

    assert_eq!(agent.tick(), TickDecision::OpenSession);
    let event = next_event(&mut agent).await;
    agent.handle_event(event);
    assert_eq!(
        agent.status().get_status(),
        "session unavailable: Chrome launch failed"
    );

    // 之后的 tick 不再重试，也不出队
    assert_eq!(agent.tick(), TickDecision::OpenSession);
    assert_eq!(agent.queue().len(), 1);
    assert!(agent.status().get_status().starts_with("session unavailable"));
}

#[tokio::test]
async fn test_marker_completion_and_export() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = test_config();
    cfg.executor.output_dir = dir.path().to_path_buf();
    cfg.executor.completion = CompletionSection::Marker {
        poll_secs: 1,
        timeout_secs: 30,
        done_markers: vec!["completed".into()],
        stages: vec![],
        plan_wait_secs: 0,
        plan_markers: vec![],
    };
    let factory = MockFactory::new(MockSurface {
        done_after_probes: 2,
        ..Default::default()
    });
    let mut agent = Agent::new(&cfg, factory.clone());
    make_ready(&mut agent).await;

    agent.enqueue(ResearchTask::new("brief", "market brief", "out/brief.html"));
    assert_eq!(agent.tick(), TickDecision::Dispatch);

    let event = next_event(&mut agent).await;
    match &event {
        AgentEvent::TaskFinished { outcome, .. } => {
            let path = outcome.clone().unwrap().unwrap();
            assert!(path.ends_with("brief.html"));
        }
        other => panic!("unexpected event {:?}", other),
    }
    agent.handle_event(event);

    let html = std::fs::read_to_string(dir.path().join("out/brief.html")).unwrap();
    assert!(html.contains("Markets closed higher"));
    assert_eq!(std::fs::read(dir.path().join("out/brief.png")).unwrap(), b"\x89PNG");
    // 一次提交前的基线读取 + 一次轮询
    assert_eq!(factory.surface.probes.load(Ordering::SeqCst), 2);
    assert_eq!(agent.status().get_status(), "idle");
}

#[tokio::test]
async fn test_marker_timeout_fails_task() {
    let mut cfg = test_config();
    cfg.executor.completion = CompletionSection::Marker {
        poll_secs: 1,
        timeout_secs: 1,
        done_markers: vec!["completed".into()],
        stages: vec![],
        plan_wait_secs: 0,
        plan_markers: vec![],
    };
    let factory = MockFactory::new(MockSurface::default());
    let mut agent = Agent::new(&cfg, factory);
    make_ready(&mut agent).await;

    agent.enqueue(task("slow", "never finishes"));
    agent.tick();
    let event = next_event(&mut agent).await;
    agent.handle_event(event);

    assert!(!agent.run_state().is_running());
    assert_eq!(
        agent.status().get_status(),
        "failed: slow: Completion not observed within 1s"
    );
}

fn marker_config(timeout_secs: u64) -> AppConfig {
    let mut cfg = test_config();
    cfg.executor.completion = CompletionSection::Marker {
        poll_secs: 1,
        timeout_secs,
        done_markers: vec!["completed".into(), "已完成".into()],
        stages: vec![],
        plan_wait_secs: 0,
        plan_markers: vec![],
    };
    cfg
}

#[tokio::test]
async fn test_earlier_answer_marker_does_not_complete_next_task() {
    let factory = MockFactory::new(MockSurface {
        earlier_answer: "Earlier brief: research completed.\n",
        ..Default::default()
    });
    let mut agent = Agent::new(&marker_config(3), factory.clone());
    make_ready(&mut agent).await;

    agent.enqueue(task("T2", "second question"));
    agent.enqueue(task("T3", "third question"));
    assert_eq!(agent.tick(), TickDecision::Dispatch);

    // 页面上只有旧的完成标记：T2 一直占着执行权直到超时
    let event = next_event(&mut agent).await;
    match &event {
        AgentEvent::TaskFinished { task, outcome } => {
            assert_eq!(task.name, "T2");
            assert_eq!(outcome, &Err(AgentError::CompletionTimeout(3)));
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert!(factory.surface.probes.load(Ordering::SeqCst) >= 3);
    assert!(agent.run_state().is_running());
    assert_eq!(agent.tick(), TickDecision::Busy);
    assert_eq!(agent.queue().names(), vec!["T3"]);
    assert_eq!(factory.surface.submitted().len(), 1);

    agent.handle_event(event);
    assert_eq!(
        agent.status().get_status(),
        "failed: T2: Completion not observed within 3s"
    );
}

#[tokio::test]
async fn test_new_marker_after_earlier_answer_completes_task() {
    let factory = MockFactory::new(MockSurface {
        earlier_answer: "Earlier brief: research completed.\n",
        done_after_probes: 3,
        ..Default::default()
    });
    let mut agent = Agent::new(&marker_config(30), factory.clone());
    make_ready(&mut agent).await;

    agent.enqueue(task("T2", "second question"));
    assert_eq!(agent.tick(), TickDecision::Dispatch);

    let event = next_event(&mut agent).await;
    assert!(matches!(&event, AgentEvent::TaskFinished { outcome: Ok(None), .. }));
    agent.handle_event(event);

    // 基线 + 第一次轮询（只有旧标记）+ 第二次轮询（新标记）
    assert_eq!(factory.surface.probes.load(Ordering::SeqCst), 3);
    assert_eq!(agent.status().get_status(), "idle");
}
