//! URL Vitals - URL健康监控引擎
//!
//! 这是一个用Rust编写的URL健康监控工具，支持：
//! - HTTP/HTTPS探测与结果分类
//! - 带退避的重试控制
//! - 错峰的批量检测派发
//! - 定时调度与过期记录清理
//! - 结构化日志记录

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod health;
pub mod logging;
pub mod queue;
pub mod storage;

#[cfg(test)]
pub(crate) mod testing;

// 重新导出主要类型
pub use config::{Config, GlobalConfig, TargetConfig};
pub use crate::core::{MonitorEngine, ServiceLauncher};
pub use error::{Result, UrlVitalsError};
pub use health::{HealthCheckRecord, MonitoredTarget, ProbeOutcome, StatusSummary, TargetId};

/// 应用程序版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 应用程序名称
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// 应用程序描述
pub const APP_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
