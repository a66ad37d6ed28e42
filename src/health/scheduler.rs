//! 定时调度器模块
//!
//! 两个互相独立的定时触发器：定期派发批量检测，定期派发记录清理。
//! 触发器只负责把任务投递到队列，不等待任务完成，前后两次触发的工作可以重叠。

use crate::queue::{Task, TaskQueue};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

/// 调度间隔
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleSettings {
    /// 批量检测间隔
    pub check_interval: Duration,
    /// 记录清理间隔
    pub sweep_interval: Duration,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// 单个触发器的统计
#[derive(Debug, Clone, Default)]
pub struct TriggerStats {
    /// 成功投递次数
    pub fired: u64,
    /// 投递失败次数
    pub failed: u64,
    /// 最后一次成功投递时间
    pub last_fired: Option<DateTime<Utc>>,
}

/// 调度器状态
#[derive(Debug, Clone, Default)]
pub struct SchedulerStatus {
    /// 调度器是否运行中
    pub is_running: bool,
    /// 运行中的触发器数量
    pub running_triggers: usize,
    /// 批量检测触发器统计
    pub batch_check: TriggerStats,
    /// 清理触发器统计
    pub sweep: TriggerStats,
}

/// 调度器trait，定义调度接口
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// 启动调度器
    ///
    /// # 返回
    /// * `Result<()>` - 启动结果
    async fn start(&self) -> Result<()>;

    /// 停止调度器
    ///
    /// # 返回
    /// * `Result<()>` - 停止结果
    async fn stop(&self) -> Result<()>;

    /// 获取调度器状态
    ///
    /// # 返回
    /// * `SchedulerStatus` - 当前状态
    async fn get_status(&self) -> SchedulerStatus;
}

/// 固定间隔调度器
pub struct IntervalScheduler {
    /// 任务队列
    queue: Arc<dyn TaskQueue>,
    /// 调度间隔
    settings: ScheduleSettings,
    /// 运行中的触发器
    tasks: Arc<RwLock<Vec<JoinHandle<()>>>>,
    /// 调度器状态
    status: Arc<RwLock<SchedulerStatus>>,
}

impl IntervalScheduler {
    /// 创建新的调度器
    ///
    /// # 参数
    /// * `queue` - 任务队列
    /// * `settings` - 调度间隔
    ///
    /// # 返回
    /// * `Self` - 调度器实例
    pub fn new(queue: Arc<dyn TaskQueue>, settings: ScheduleSettings) -> Self {
        Self {
            queue,
            settings,
            tasks: Arc::new(RwLock::new(Vec::new())),
            status: Arc::new(RwLock::new(SchedulerStatus::default())),
        }
    }

    /// 启动一个定时触发器，首次触发立即执行
    fn spawn_trigger(&self, task: Task, period: Duration) -> JoinHandle<()> {
        let queue = Arc::clone(&self.queue);
        let status = Arc::clone(&self.status);

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!("启动定时触发器: {} (间隔 {:?})", task.kind(), period);

            loop {
                ticker.tick().await;
                debug!("触发定时任务: {}", task.kind());

                let result = queue.schedule(task.clone(), Duration::ZERO).await;

                let mut status = status.write().await;
                let stats = match task {
                    Task::Sweep => &mut status.sweep,
                    _ => &mut status.batch_check,
                };
                match result {
                    Ok(handle) => {
                        stats.fired += 1;
                        stats.last_fired = Some(Utc::now());
                        debug!("定时任务已投递: {} ({})", handle.id, handle.kind);
                    }
                    Err(e) => {
                        stats.failed += 1;
                        error!("投递定时任务失败 {}: {}", task.kind(), e);
                    }
                }
            }
        })
    }
}

#[async_trait]
impl Scheduler for IntervalScheduler {
    async fn start(&self) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        if !tasks.is_empty() {
            debug!("调度器已在运行");
            return Ok(());
        }

        info!(
            "启动定时调度器，检测间隔: {:?}，清理间隔: {:?}",
            self.settings.check_interval, self.settings.sweep_interval
        );

        tasks.push(self.spawn_trigger(Task::BatchCheck, self.settings.check_interval));
        tasks.push(self.spawn_trigger(Task::Sweep, self.settings.sweep_interval));

        let mut status = self.status.write().await;
        status.is_running = true;
        status.running_triggers = tasks.len();

        info!("定时调度器启动完成");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        info!("停止定时调度器");

        let mut tasks = self.tasks.write().await;
        for task in tasks.drain(..) {
            task.abort();
        }

        let mut status = self.status.write().await;
        status.is_running = false;
        status.running_triggers = 0;

        info!("定时调度器已停止");
        Ok(())
    }

    async fn get_status(&self) -> SchedulerStatus {
        self.status.read().await.clone()
    }
}

impl Drop for IntervalScheduler {
    fn drop(&mut self) {
        // drop中不能await，只在能立即拿到锁时中止触发器
        if let Ok(mut tasks) = self.tasks.try_write() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
    }
}
