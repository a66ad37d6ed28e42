//! 历史记录清理
//!
//! 一次批量删除所有早于保留窗口的健康检测记录

use crate::error::MonitorError;
use crate::storage::RecordStore;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{error, info};

/// 过期记录清理器
pub struct RetentionSweeper {
    /// 记录存储
    store: Arc<dyn RecordStore>,
    /// 保留窗口
    retention: Duration,
}

impl RetentionSweeper {
    /// 创建新的清理器
    ///
    /// # 参数
    /// * `store` - 记录存储
    /// * `retention` - 保留窗口
    pub fn new(store: Arc<dyn RecordStore>, retention: Duration) -> Self {
        Self { store, retention }
    }

    /// 保留窗口
    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// 给定时间点对应的截止时间
    ///
    /// 保留窗口过大导致时间下溢时返回错误。
    pub fn cutoff(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, MonitorError> {
        now.checked_sub_signed(self.retention)
            .ok_or(MonitorError::RetentionOutOfRange {
                retention: self.retention,
            })
    }

    /// 以当前时间执行清理
    pub async fn sweep(&self) -> Result<u64, MonitorError> {
        self.sweep_at(Utc::now()).await
    }

    /// 删除 `checked_at` 严格早于 `now - retention` 的记录
    ///
    /// 删除失败时整个清理视为失败，错误返回给调用方。
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<u64, MonitorError> {
        let cutoff = self.cutoff(now).inspect_err(|e| {
            error!("Error in scheduled cleanup: {}", e);
        })?;
        info!(
            "Starting scheduled cleanup of health checks older than {}",
            cutoff
        );

        match self.store.delete_older_than(cutoff).await {
            Ok(deleted) => {
                info!(
                    "Scheduled cleanup completed: deleted {} old health check records",
                    deleted
                );
                Ok(deleted)
            }
            Err(e) => {
                error!("Error in scheduled cleanup: {}", e);
                Err(MonitorError::SweepFailed(e))
            }
        }
    }
}
