//! 核心模块
//!
//! 包含监控引擎、服务装配和信号处理

pub mod engine;
pub mod service;
pub mod signal;

// 重新导出主要类型
pub use engine::{MonitorEngine, DEFAULT_HISTORY_LIMIT, DEFAULT_RETENTION_DAYS};
pub use service::{ServiceComponents, ServiceLauncher, StoreHandles};
pub use signal::{setup_signal_handlers, wait_for_shutdown};
