//! 批量派发器
//!
//! 为每个目标派发一个独立的探测周期，开始时间按序号错开，避免同时发起大量请求

use crate::error::Result;
use crate::health::model::TargetId;
use crate::queue::{Task, TaskQueue};
use crate::storage::TargetRepository;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// 派发错开间隔
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSettings {
    /// 定时批量检测的错开间隔
    pub batch_stagger: Duration,
    /// 手动批量检测的错开间隔
    pub bulk_stagger: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            batch_stagger: Duration::from_secs(2),
            bulk_stagger: Duration::from_secs(1),
        }
    }
}

/// 批量派发器
pub struct BatchDispatcher {
    /// 目标仓库
    targets: Arc<dyn TargetRepository>,
    /// 任务队列
    queue: Arc<dyn TaskQueue>,
    /// 错开间隔
    settings: DispatchSettings,
}

impl BatchDispatcher {
    /// 创建新的批量派发器
    pub fn new(
        targets: Arc<dyn TargetRepository>,
        queue: Arc<dyn TaskQueue>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            targets,
            queue,
            settings,
        }
    }

    /// 为所有启用的目标派发探测
    ///
    /// 单个目标派发失败只记录日志，不中断批次。
    ///
    /// # 返回
    /// * `Result<usize>` - 成功派发的数量
    pub async fn dispatch_all(&self) -> Result<usize> {
        let active_targets = self.targets.list_active_targets().await?;
        info!(
            "Starting scheduled batch health check for {} URLs",
            active_targets.len()
        );

        let mut queued_count: u32 = 0;
        for target in &active_targets {
            let delay = self.settings.batch_stagger * queued_count;
            match self.queue.schedule(Task::probe(target.id), delay).await {
                Ok(_) => queued_count += 1,
                Err(e) => error!("Error queueing check for {}: {}", target.name, e),
            }
        }

        info!("Scheduled check: Queued {} URL health checks", queued_count);
        Ok(queued_count as usize)
    }

    /// 为调用方给定的目标列表派发探测
    ///
    /// # 参数
    /// * `target_ids` - 目标ID列表
    ///
    /// # 返回
    /// * `Result<usize>` - 成功派发的数量
    pub async fn dispatch_subset(&self, target_ids: &[TargetId]) -> Result<usize> {
        if target_ids.is_empty() {
            info!("No URLs to check");
            return Ok(0);
        }

        info!("Starting manual bulk check for {} URLs", target_ids.len());

        let mut queued_count = 0;
        for (index, target_id) in target_ids.iter().enumerate() {
            let delay = self.settings.bulk_stagger * index as u32;
            match self.queue.schedule(Task::probe(*target_id), delay).await {
                Ok(_) => queued_count += 1,
                Err(e) => error!("Error queueing check for URL {}: {}", target_id, e),
            }
        }

        info!("Manual bulk check: Queued {} URL health checks", queued_count);
        Ok(queued_count)
    }
}
