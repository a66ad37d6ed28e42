//! 健康检测模块
//!
//! 提供HTTP探测、重试控制、结果记录、批量派发、定时调度和记录清理功能

pub mod dispatcher;
pub mod model;
pub mod probe;
pub mod recorder;
pub mod retry;
pub mod scheduler;
pub mod sweeper;

// 重新导出主要类型
pub use dispatcher::{BatchDispatcher, DispatchSettings};
pub use model::{
    HealthCheckRecord, MonitoredTarget, RecordId, StatusSummary, TargetId, TargetOverview,
};
pub use probe::{HttpProber, ProbeOutcome, ProbeSettings, Prober};
pub use recorder::{ProbeObserver, ResultRecorder, TracingObserver};
pub use retry::{CycleState, CycleStep, ProbeCycle, RetryPolicy};
pub use scheduler::{IntervalScheduler, ScheduleSettings, Scheduler, SchedulerStatus};
pub use sweeper::RetentionSweeper;
