//! Research Bee - 单操作员研究自动化助手
//!
//! 复用一个长期存在的浏览器会话（研究助手网页），按入队顺序逐个执行脚本化的研究任务，
//! 同一时刻至多一个任务在执行，排队的请求不会丢失。
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 任务队列、会话生命周期、执行器、调度 tick、状态上报与协调循环
//! - **browser**: 注入脚本与 Chrome（headless_chrome）会话
//! - **integrations**: HTTP 控制面（入队 / 状态查询）
//! - **observability**: 日志初始化

pub mod browser;
pub mod config;
pub mod core;
#[cfg(feature = "http")]
pub mod integrations;
pub mod observability;
