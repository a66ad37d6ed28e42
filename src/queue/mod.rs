//! 任务队列模块
//!
//! 核心通过消息传递派发任务：`schedule(task, delay)` 立即返回句柄，
//! 任务由工作池在延迟到期后独立执行，核心从不同步等待句柄。

pub mod rate_limit;
pub mod worker;

use crate::error::{DispatchError, Result};
use crate::health::model::TargetId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

// 重新导出主要类型
pub use rate_limit::{RateLimit, RateLimiter};
pub use worker::{TaskReceiver, TokioTaskQueue, WorkerConfig, WorkerPool, WorkerStats};

/// 可派发的任务
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum Task {
    /// 探测周期中的一次尝试
    Probe { target_id: TargetId, attempt: u32 },
    /// 对所有启用目标的定时批量检测
    BatchCheck,
    /// 对指定目标列表的手动批量检测
    BulkCheck { target_ids: Vec<TargetId> },
    /// 清理过期记录
    Sweep,
}

impl Task {
    /// 首次探测尝试
    pub fn probe(target_id: TargetId) -> Self {
        Task::Probe {
            target_id,
            attempt: 0,
        }
    }

    /// 任务类型
    pub fn kind(&self) -> TaskKind {
        match self {
            Task::Probe { .. } => TaskKind::Probe,
            Task::BatchCheck => TaskKind::BatchCheck,
            Task::BulkCheck { .. } => TaskKind::BulkCheck,
            Task::Sweep => TaskKind::Sweep,
        }
    }
}

/// 任务类型，用于按类型限速和统计
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Probe,
    BatchCheck,
    BulkCheck,
    Sweep,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskKind::Probe => write!(f, "probe"),
            TaskKind::BatchCheck => write!(f, "batch_check"),
            TaskKind::BulkCheck => write!(f, "bulk_check"),
            TaskKind::Sweep => write!(f, "sweep"),
        }
    }
}

/// 已派发任务的不透明句柄
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskHandle {
    /// 任务ID
    pub id: Uuid,
    /// 任务类型
    pub kind: TaskKind,
    /// 预计开始时间
    pub eta: DateTime<Utc>,
}

impl TaskHandle {
    /// 为即将派发的任务创建句柄
    pub fn new(kind: TaskKind, delay: Duration) -> Self {
        let delay = chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero());
        Self {
            id: Uuid::new_v4(),
            kind,
            eta: Utc::now() + delay,
        }
    }
}

/// 任务执行报告
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum TaskReport {
    /// 探测周期结束并写入记录
    Checked {
        target_name: String,
        healthy: bool,
        error_message: Option<String>,
    },
    /// 已安排下一次重试
    Retrying {
        target_name: String,
        next_attempt: u32,
    },
    /// 目标不存在或未启用，未写入记录
    NotFound { target_id: TargetId },
    /// 已派发的探测数量
    Queued { count: usize },
    /// 目标列表为空
    NothingToCheck,
    /// 清理删除的记录数量
    Swept { deleted: u64 },
}

impl std::fmt::Display for TaskReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskReport::Checked {
                target_name,
                healthy,
                error_message,
            } => {
                let state = if *healthy { "Healthy" } else { "Unhealthy" };
                write!(f, "Checked {target_name}: {state}")?;
                if let Some(message) = error_message {
                    write!(f, " ({message})")?;
                }
                Ok(())
            }
            TaskReport::Retrying {
                target_name,
                next_attempt,
            } => write!(f, "Retrying {target_name} (attempt {next_attempt})"),
            TaskReport::NotFound { target_id } => {
                write!(f, "URL with id {target_id} not found or inactive")
            }
            TaskReport::Queued { count } => write!(f, "Queued {count} URL checks"),
            TaskReport::NothingToCheck => write!(f, "No URLs to check"),
            TaskReport::Swept { deleted } => {
                write!(f, "Deleted {deleted} old health check records")
            }
        }
    }
}

/// 任务队列trait，延迟派发，至少投递一次
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// 在 `delay` 之后派发任务，立即返回句柄
    async fn schedule(&self, task: Task, delay: Duration) -> std::result::Result<TaskHandle, DispatchError>;
}

/// 任务执行器trait，由工作池调用
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// 执行一个任务
    async fn execute(&self, task: Task) -> Result<TaskReport>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_kind() {
        assert_eq!(Task::probe(1).kind(), TaskKind::Probe);
        assert_eq!(Task::BatchCheck.kind(), TaskKind::BatchCheck);
        assert_eq!(
            Task::BulkCheck { target_ids: vec![1] }.kind(),
            TaskKind::BulkCheck
        );
        assert_eq!(Task::Sweep.kind().to_string(), "sweep");
    }

    #[test]
    fn test_task_report_display() {
        let healthy = TaskReport::Checked {
            target_name: "Test Site".to_string(),
            healthy: true,
            error_message: None,
        };
        assert_eq!(healthy.to_string(), "Checked Test Site: Healthy");

        let unhealthy = TaskReport::Checked {
            target_name: "Test Site".to_string(),
            healthy: false,
            error_message: Some("Connection failed".to_string()),
        };
        assert_eq!(
            unhealthy.to_string(),
            "Checked Test Site: Unhealthy (Connection failed)"
        );

        assert_eq!(
            TaskReport::NotFound { target_id: 99999 }.to_string(),
            "URL with id 99999 not found or inactive"
        );
        assert_eq!(TaskReport::Queued { count: 3 }.to_string(), "Queued 3 URL checks");
        assert_eq!(TaskReport::NothingToCheck.to_string(), "No URLs to check");
        assert_eq!(
            TaskReport::Swept { deleted: 4 }.to_string(),
            "Deleted 4 old health check records"
        );
    }

    #[test]
    fn test_task_handle_eta() {
        let before = Utc::now();
        let handle = TaskHandle::new(TaskKind::Probe, Duration::from_secs(60));
        assert!(handle.eta >= before + chrono::Duration::seconds(60));
        assert_eq!(handle.kind, TaskKind::Probe);
    }
}
