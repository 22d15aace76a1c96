//! 任务执行器：在已就绪的会话上执行一个研究任务
//!
//! 流程：
//! 1. 占用执行权（RunState.claim）并把状态设为 `running: <name>`
//! 2. 构造提交脚本，在派生任务中注入页面，随后等待完成信号
//! 3. 派生任务回送 `AgentEvent::TaskFinished`，协调协程调用 [`TaskExecutor::finish`] 释放执行权
//!
//! 失败的任务不重新入队，直接丢弃（至多一次），避免一个坏任务永远堵住队列。

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::browser::script::{build_submit_script, parse_outcome, parse_probe, PROBE_SCRIPT};
use crate::config::{CompletionSection, ExecutorSection, StageMarker};
use crate::core::error::AgentError;
use crate::core::event::AgentEvent;
use crate::core::run_state::RunState;
use crate::core::session::{ContentSurface, Session};
use crate::core::status::{AgentStatus, StatusReporter};
use crate::core::task::ResearchTask;

pub struct TaskExecutor {
    settings: Arc<ExecutorSection>,
}

impl TaskExecutor {
    pub fn new(settings: ExecutorSection) -> Self {
        Self {
            settings: Arc::new(settings),
        }
    }

    /// 占用执行权并在后台开始执行；立即返回，不等待任务结束
    ///
    /// 调用方需保证会话已就绪，否则返回 `SessionNotReady` 且不改变任何状态。
    pub fn run(
        &self,
        task: ResearchTask,
        session: &Session,
        run_state: &mut RunState,
        status: &StatusReporter,
        events: &mpsc::UnboundedSender<AgentEvent>,
    ) -> Result<(), AgentError> {
        let surface = session.surface()?;
        run_state.claim(task.clone())?;
        status.set_status(AgentStatus::Running {
            task: task.name.clone(),
        });
        tracing::info!(task = %task.name, "task started");

        let settings = Arc::clone(&self.settings);
        let events = events.clone();
        tokio::spawn(async move {
            let outcome = execute(surface.as_ref(), &task, &settings).await;
            let _ = events.send(AgentEvent::TaskFinished { task, outcome });
        });
        Ok(())
    }

    /// 完成信号：释放执行权并更新状态；返回被释放的任务
    pub fn finish(
        &self,
        task: &ResearchTask,
        outcome: Result<Option<String>, AgentError>,
        run_state: &mut RunState,
        status: &StatusReporter,
    ) -> Option<ResearchTask> {
        let released = run_state.release();
        if released.as_ref().map(|t| t.name.as_str()) != Some(task.name.as_str()) {
            tracing::warn!(task = %task.name, "completion signal for a task that was not running");
        }

        match outcome {
            Ok(exported) => {
                tracing::info!(task = %task.name, output = ?exported, "task completed");
                status.set_status(AgentStatus::Idle);
            }
            Err(e) => {
                tracing::error!(task = %task.name, error = %e, "task failed, dropped without retry");
                status.set_status(AgentStatus::Failed {
                    task: task.name.clone(),
                    reason: e.to_string(),
                });
            }
        }
        released
    }
}

/// 记基线 → 提交 → 等待完成 → 导出
async fn execute(
    surface: &dyn ContentSurface,
    task: &ResearchTask,
    settings: &ExecutorSection,
) -> Result<Option<String>, AgentError> {
    // 会话被复用，上一轮回答的完成标记还留在页面上
    let baseline = match &settings.completion {
        CompletionSection::Marker { done_markers, .. } => {
            count_markers(&page_text(surface).await?, done_markers)
        }
        CompletionSection::Simulated { .. } => 0,
    };

    let script = build_submit_script(&render_date(&task.query));
    let value = surface.evaluate(&script).await?;
    let submitted = parse_outcome(&value)?;
    tracing::info!(
        task = %task.name,
        deep_research = submitted.deep_research,
        baseline,
        "research request submitted"
    );

    await_completion(surface, task, &settings.completion, baseline).await?;

    if task.output_target.trim().is_empty() {
        return Ok(None);
    }
    let html = surface.content().await?;
    let screenshot = if settings.screenshot {
        match surface.screenshot().await {
            Ok(png) => Some(png),
            Err(e) => {
                tracing::warn!(task = %task.name, error = %e, "screenshot skipped");
                None
            }
        }
    } else {
        None
    };
    let path = export_result(
        &settings.output_dir,
        &task.output_target,
        &html,
        screenshot.as_deref(),
        settings.export_text,
    )
    .await?;
    Ok(Some(path.display().to_string()))
}

async fn page_text(surface: &dyn ContentSurface) -> Result<String, AgentError> {
    surface.evaluate(PROBE_SCRIPT).await.and_then(|v| parse_probe(&v))
}

async fn await_completion(
    surface: &dyn ContentSurface,
    task: &ResearchTask,
    completion: &CompletionSection,
    baseline: usize,
) -> Result<(), AgentError> {
    match completion {
        CompletionSection::Simulated { delay_secs } => {
            tokio::time::sleep(Duration::from_secs(*delay_secs)).await;
            Ok(())
        }
        CompletionSection::Marker {
            poll_secs,
            timeout_secs,
            done_markers,
            stages,
            plan_wait_secs,
            plan_markers,
        } => {
            let watch = CompletionWatch {
                poll: Duration::from_secs((*poll_secs).max(1)),
                baseline,
                done_markers,
                stages,
                plan_wait: Duration::from_secs(*plan_wait_secs),
                plan_markers,
            };
            tokio::time::timeout(
                Duration::from_secs(*timeout_secs),
                watch.poll_until_done(surface, task),
            )
            .await
            .map_err(|_| AgentError::CompletionTimeout(*timeout_secs))
        }
    }
}

/// marker 模式的一次等待
struct CompletionWatch<'a> {
    poll: Duration,
    /// 提交前页面上已有的完成标记数
    baseline: usize,
    done_markers: &'a [String],
    stages: &'a [StageMarker],
    plan_wait: Duration,
    plan_markers: &'a [String],
}

impl<'a> CompletionWatch<'a> {
    async fn poll_until_done(&self, surface: &dyn ContentSurface, task: &ResearchTask) {
        let started = Instant::now();
        let mut baseline = self.baseline;
        let mut plan = if self.plan_markers.is_empty() {
            PlanWatch::Off
        } else {
            PlanWatch::Waiting
        };
        let mut last_stage: Option<&str> = None;
        loop {
            tokio::time::sleep(self.poll).await;
            let text = match page_text(surface).await {
                Ok(text) => text,
                Err(e) => {
                    tracing::debug!(task = %task.name, error = %e, "completion probe failed");
                    continue;
                }
            };

            let done = count_markers(&text, self.done_markers);
            if done > baseline {
                return;
            }
            // 页面被清空（新对话）时基线随之下降
            baseline = done;

            let next = plan.observe(&text, self.plan_markers, started.elapsed(), self.plan_wait);
            if next != plan {
                match next {
                    PlanWatch::Detected => {
                        tracing::info!(task = %task.name, "research plan detected")
                    }
                    PlanWatch::Missing => tracing::warn!(
                        task = %task.name,
                        wait_secs = self.plan_wait.as_secs(),
                        "no research plan yet, the assistant may be answering directly"
                    ),
                    PlanWatch::Waiting | PlanWatch::Off => {}
                }
                plan = next;
            }

            if let Some(stage) = detect_stage(&text, self.stages) {
                if last_stage != Some(stage) {
                    tracing::info!(task = %task.name, stage, "research progress");
                    last_stage = Some(stage);
                }
            }
        }
    }
}

/// 提交后研究计划是否出现（只影响日志）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PlanWatch {
    Off,
    Waiting,
    Detected,
    Missing,
}

impl PlanWatch {
    pub(crate) fn observe(
        self,
        text: &str,
        markers: &[String],
        elapsed: Duration,
        wait: Duration,
    ) -> Self {
        match self {
            PlanWatch::Waiting if contains_any(text, markers) => PlanWatch::Detected,
            PlanWatch::Waiting if elapsed >= wait => PlanWatch::Missing,
            other => other,
        }
    }
}

pub(crate) fn contains_any(text: &str, markers: &[String]) -> bool {
    let lower = text.to_lowercase();
    markers
        .iter()
        .any(|m| text.contains(m.as_str()) || lower.contains(&m.to_lowercase()))
}

/// 页面上所有标记出现的总次数（不区分大小写）
pub(crate) fn count_markers(text: &str, markers: &[String]) -> usize {
    let lower = text.to_lowercase();
    markers
        .iter()
        .filter(|m| !m.is_empty())
        .map(|m| lower.matches(m.to_lowercase().as_str()).count())
        .sum()
}

/// 按配置顺序返回第一个命中的阶段
pub(crate) fn detect_stage<'a>(text: &str, stages: &'a [StageMarker]) -> Option<&'a str> {
    stages
        .iter()
        .find(|s| contains_any(text, &s.markers))
        .map(|s| s.label.as_str())
}

/// `{date}` 替换为本地日期 YYYY-MM-DD（问题文本与输出文件名都支持）
pub(crate) fn render_date(template: &str) -> String {
    let today = chrono::Local::now().format("%Y-%m-%d").to_string();
    template.replace("{date}", &today)
}

/// 写入页面 HTML，截图与纯文本写在旁边（.png / .txt），返回 HTML 路径
pub(crate) async fn export_result(
    output_dir: &Path,
    target: &str,
    html: &str,
    screenshot: Option<&[u8]>,
    export_text: bool,
) -> Result<PathBuf, AgentError> {
    let path = output_dir.join(render_date(target));
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| AgentError::Export(format!("{}: {}", parent.display(), e)))?;
    }
    tokio::fs::write(&path, html)
        .await
        .map_err(|e| AgentError::Export(format!("{}: {}", path.display(), e)))?;

    if let Some(png) = screenshot {
        let png_path = path.with_extension("png");
        tokio::fs::write(&png_path, png)
            .await
            .map_err(|e| AgentError::Export(format!("{}: {}", png_path.display(), e)))?;
    }

    if export_text {
        let text = html2text::from_read(html.as_bytes(), 120).unwrap_or_else(|_| html.to_string());
        let text_path = path.with_extension("txt");
        tokio::fs::write(&text_path, text)
            .await
            .map_err(|e| AgentError::Export(format!("{}: {}", text_path.display(), e)))?;
    }
    Ok(path)
}
