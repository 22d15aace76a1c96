//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `RBEE__*` 覆盖（双下划线表示嵌套，如 `RBEE__AGENT__POLL_INTERVAL_SECS=30`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::core::task::ResearchTask;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub agent: AgentSection,
    pub browser: BrowserSection,
    pub executor: ExecutorSection,
    pub http: HttpSection,
    /// 启动时按顺序入队的任务
    pub tasks: Vec<ResearchTask>,
}

/// [agent] 段：轮询周期、启动延迟、研究助手地址
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    pub poll_interval_secs: u64,
    /// 启动后等待多久再打开会话（让 UI 先渲染）
    pub startup_delay_secs: u64,
    pub target_url: String,
    /// 页面加载后出现这些文本即认为尚未登录；为空则不检查
    pub login_markers: Vec<String>,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            startup_delay_secs: 1,
            target_url: "https://gemini.google.com/app".to_string(),
            login_markers: vec!["登录".into(), "Sign in".into()],
        }
    }
}

impl AgentSection {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_delay_secs)
    }
}

/// [browser] 段：Chrome 启动或附着方式
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserSection {
    pub headless: bool,
    /// Chrome 可执行文件，未设置时自动探测
    pub executable_path: Option<PathBuf>,
    /// 已在运行的 Chrome 的 DevTools websocket 地址；设置后附着而不是新启动
    pub debugger_url: Option<String>,
    pub window_width: u32,
    pub window_height: u32,
    pub launch_timeout_secs: u64,
}

impl Default for BrowserSection {
    fn default() -> Self {
        Self {
            headless: false,
            executable_path: None,
            debugger_url: None,
            window_width: 1280,
            window_height: 800,
            launch_timeout_secs: 60,
        }
    }
}

/// [executor] 段：结果导出与完成检测
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutorSection {
    pub output_dir: PathBuf,
    /// 额外导出一份纯文本（.txt）
    pub export_text: bool,
    /// 在 HTML 旁边保存一张页面截图（.png）
    pub screenshot: bool,
    pub completion: CompletionSection,
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("reports"),
            export_text: false,
            screenshot: true,
            completion: CompletionSection::default(),
        }
    }
}

/// [executor.completion] 段：如何判断一次研究已经结束
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CompletionSection {
    /// 固定延时后视为完成（仅作占位，不观察页面）
    Simulated {
        #[serde(default = "default_simulated_delay_secs")]
        delay_secs: u64,
    },
    /// 轮询页面文本，直到出现完成标记
    Marker {
        #[serde(default = "default_marker_poll_secs")]
        poll_secs: u64,
        #[serde(default = "default_marker_timeout_secs")]
        timeout_secs: u64,
        #[serde(default = "default_done_markers")]
        done_markers: Vec<String>,
        #[serde(default = "default_stages")]
        stages: Vec<StageMarker>,
        /// 提交后多久内应出现研究计划；超过只记警告
        #[serde(default = "default_plan_wait_secs")]
        plan_wait_secs: u64,
        #[serde(default = "default_plan_markers")]
        plan_markers: Vec<String>,
    },
}

/// 进度阶段：页面出现任一 marker 即认为处于该阶段（只用于日志）
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct StageMarker {
    pub label: String,
    pub markers: Vec<String>,
}

impl Default for CompletionSection {
    fn default() -> Self {
        CompletionSection::Marker {
            poll_secs: default_marker_poll_secs(),
            timeout_secs: default_marker_timeout_secs(),
            done_markers: default_done_markers(),
            stages: default_stages(),
            plan_wait_secs: default_plan_wait_secs(),
            plan_markers: default_plan_markers(),
        }
    }
}

fn default_simulated_delay_secs() -> u64 {
    5
}

fn default_marker_poll_secs() -> u64 {
    10
}

fn default_marker_timeout_secs() -> u64 {
    1200
}

fn default_done_markers() -> Vec<String> {
    vec!["已完成".into(), "completed".into()]
}

fn default_plan_wait_secs() -> u64 {
    50
}

fn default_plan_markers() -> Vec<String> {
    vec!["研究网站".into(), "开始研究".into(), "Researching".into()]
}

fn default_stages() -> Vec<StageMarker> {
    vec![
        StageMarker {
            label: "analysing".into(),
            markers: vec!["分析结果中".into(), "分析中".into()],
        },
        StageMarker {
            label: "researching".into(),
            markers: vec!["正在研究".into(), "Researching".into()],
        },
        StageMarker {
            label: "generating".into(),
            markers: vec!["来源".into()],
        },
    ]
}

/// [http] 段：控制面监听地址
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpSection {
    pub bind: String,
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3002".to_string(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 RBEE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 RBEE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("RBEE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
