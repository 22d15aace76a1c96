//! 浏览器侧：注入脚本与 Chrome 会话实现

pub mod script;

#[cfg(feature = "browser")]
pub mod chrome;

#[cfg(feature = "browser")]
pub use chrome::{ChromeFactory, ChromeSurface};
