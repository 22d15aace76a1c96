//! 外部集成：HTTP 控制面（需 feature "http"）

pub mod http;
