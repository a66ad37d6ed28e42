//! 监控引擎
//!
//! 执行队列中的各类任务，并向外部协作方提供手动检测和状态查询接口

use crate::error::{MonitorError, Result};
use crate::health::dispatcher::{BatchDispatcher, DispatchSettings};
use crate::health::model::{HealthCheckRecord, StatusSummary, TargetId, TargetOverview};
use crate::health::probe::Prober;
use crate::health::recorder::{ProbeObserver, ResultRecorder};
use crate::health::retry::{CycleStep, ProbeCycle, RetryPolicy};
use crate::health::sweeper::RetentionSweeper;
use crate::queue::{Task, TaskExecutor, TaskHandle, TaskQueue, TaskReport};
use crate::storage::{RecordStore, TargetRepository};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// 默认历史记录条数
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// 默认记录保留天数
pub const DEFAULT_RETENTION_DAYS: i64 = 3;

/// 监控引擎
pub struct MonitorEngine {
    /// 目标仓库
    targets: Arc<dyn TargetRepository>,
    /// 记录存储
    records: Arc<dyn RecordStore>,
    /// 探测器
    prober: Arc<dyn Prober>,
    /// 任务队列
    queue: Arc<dyn TaskQueue>,
    /// 重试策略
    policy: RetryPolicy,
    /// 结果记录器
    recorder: ResultRecorder,
    /// 批量派发器
    dispatcher: BatchDispatcher,
    /// 过期记录清理器
    sweeper: RetentionSweeper,
    /// 历史记录默认条数
    history_limit: usize,
}

impl MonitorEngine {
    /// 使用默认策略创建监控引擎
    ///
    /// # 参数
    /// * `targets` - 目标仓库
    /// * `records` - 记录存储
    /// * `prober` - 探测器
    /// * `queue` - 任务队列
    ///
    /// # 返回
    /// * `Self` - 引擎实例
    pub fn new(
        targets: Arc<dyn TargetRepository>,
        records: Arc<dyn RecordStore>,
        prober: Arc<dyn Prober>,
        queue: Arc<dyn TaskQueue>,
    ) -> Self {
        let recorder = ResultRecorder::new(Arc::clone(&records));
        let dispatcher = BatchDispatcher::new(
            Arc::clone(&targets),
            Arc::clone(&queue),
            DispatchSettings::default(),
        );
        let sweeper = RetentionSweeper::new(
            Arc::clone(&records),
            chrono::Duration::days(DEFAULT_RETENTION_DAYS),
        );

        Self {
            targets,
            records,
            prober,
            queue,
            policy: RetryPolicy::default(),
            recorder,
            dispatcher,
            sweeper,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    /// 设置重试策略
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// 设置派发错开间隔
    pub fn with_dispatch_settings(mut self, settings: DispatchSettings) -> Self {
        self.dispatcher =
            BatchDispatcher::new(Arc::clone(&self.targets), Arc::clone(&self.queue), settings);
        self
    }

    /// 设置记录保留窗口
    pub fn with_retention(mut self, retention: chrono::Duration) -> Self {
        self.sweeper = RetentionSweeper::new(Arc::clone(&self.records), retention);
        self
    }

    /// 设置历史记录默认条数
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// 添加记录观察者
    pub fn with_observer(mut self, observer: Arc<dyn ProbeObserver>) -> Self {
        self.recorder = self.recorder.with_observer(observer);
        self
    }

    /// 当前重试策略
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// 执行探测周期中的一次尝试
    ///
    /// 目标不存在或未启用时不写记录；可重试的失败重新派发下一次尝试，
    /// 其余结果写入一条终态记录。重新派发失败时把当前结果作为终态记录。
    ///
    /// # 参数
    /// * `target_id` - 目标ID
    /// * `attempt` - 尝试序号（0 为首次）
    ///
    /// # 返回
    /// * `Result<TaskReport>` - 本次尝试的执行报告
    pub async fn run_probe_attempt(&self, target_id: TargetId, attempt: u32) -> Result<TaskReport> {
        let target = match self.targets.get_target(target_id).await? {
            Some(target) if target.active => target,
            _ => {
                warn!("URL with id {} not found or inactive", target_id);
                return Ok(TaskReport::NotFound { target_id });
            }
        };

        info!("开始探测 {} (第 {} 次尝试)", target, attempt);
        let outcome = self.prober.probe(&target.url).await;

        let mut cycle = ProbeCycle::resume(self.policy.clone(), attempt);
        if let CycleStep::Retry {
            next_attempt,
            delay,
        } = cycle.advance(&outcome)
        {
            let retry = Task::Probe {
                target_id,
                attempt: next_attempt,
            };
            match self.queue.schedule(retry, delay).await {
                Ok(handle) => {
                    info!(
                        "Retrying check for {} in {}s (attempt {}/{}): {}",
                        target.name,
                        delay.as_secs(),
                        next_attempt,
                        self.policy.max_retries,
                        outcome.error_message().unwrap_or_default()
                    );
                    debug!("已派发重试任务: {}", handle.id);
                    return Ok(TaskReport::Retrying {
                        target_name: target.name,
                        next_attempt,
                    });
                }
                Err(e) => {
                    error!("派发重试任务失败 {}，记录当前结果: {}", target.name, e);
                }
            }
        }

        self.recorder.record(&target, &outcome).await;

        Ok(TaskReport::Checked {
            target_name: target.name,
            healthy: outcome.is_healthy(),
            error_message: outcome.error_message(),
        })
    }

    /// 手动检测单个目标
    ///
    /// 只确认任务已入队，不等待探测完成。
    ///
    /// # 参数
    /// * `target_id` - 目标ID
    ///
    /// # 返回
    /// * `Result<TaskHandle>` - 任务句柄
    pub async fn trigger_check(&self, target_id: TargetId) -> Result<TaskHandle> {
        if self.targets.get_target(target_id).await?.is_none() {
            return Err(MonitorError::TargetNotFound { id: target_id }.into());
        }

        let handle = self
            .queue
            .schedule(Task::probe(target_id), Duration::ZERO)
            .await?;
        info!("已派发手动检测: URL {} ({})", target_id, handle.id);
        Ok(handle)
    }

    /// 手动批量检测
    ///
    /// # 参数
    /// * `target_ids` - 目标ID列表
    ///
    /// # 返回
    /// * `Result<usize>` - 入队的目标数量
    pub async fn trigger_bulk_check(&self, target_ids: Vec<TargetId>) -> Result<usize> {
        if target_ids.is_empty() {
            info!("No URLs to check");
            return Ok(0);
        }

        let count = target_ids.len();
        let handle = self
            .queue
            .schedule(Task::BulkCheck { target_ids }, Duration::ZERO)
            .await?;
        info!("已派发批量检测: {} 个URL ({})", count, handle.id);
        Ok(count)
    }

    /// 目标的状态摘要
    pub async fn get_status_summary(&self, target_id: TargetId) -> Result<StatusSummary> {
        let latest = self.records.latest_for(target_id).await?;
        Ok(StatusSummary::from_latest(latest.as_ref()))
    }

    /// 目标的历史记录，按时间倒序
    ///
    /// # 参数
    /// * `target_id` - 目标ID
    /// * `limit` - 最大条数，为空时使用默认值
    pub async fn target_history(
        &self,
        target_id: TargetId,
        limit: Option<usize>,
    ) -> Result<Vec<HealthCheckRecord>> {
        if self.targets.get_target(target_id).await?.is_none() {
            return Err(MonitorError::TargetNotFound { id: target_id }.into());
        }
        let limit = limit.unwrap_or(self.history_limit);
        Ok(self.records.list_for(target_id, limit).await?)
    }

    /// 所有目标的概览
    pub async fn target_overview(&self) -> Result<Vec<TargetOverview>> {
        let targets = self.targets.list_targets().await?;
        let mut overview = Vec::with_capacity(targets.len());

        for target in targets {
            let latest = self.records.latest_for(target.id).await?;
            let status = StatusSummary::from_latest(latest.as_ref());
            overview.push(TargetOverview {
                target,
                latest,
                status,
            });
        }

        Ok(overview)
    }

    /// 立即执行一次记录清理
    pub async fn sweep_now(&self) -> Result<u64> {
        Ok(self.sweeper.sweep().await?)
    }
}

#[async_trait]
impl TaskExecutor for MonitorEngine {
    async fn execute(&self, task: Task) -> Result<TaskReport> {
        let report = match task {
            Task::Probe {
                target_id,
                attempt,
            } => self.run_probe_attempt(target_id, attempt).await?,
            Task::BatchCheck => match self.dispatcher.dispatch_all().await? {
                0 => TaskReport::NothingToCheck,
                count => TaskReport::Queued { count },
            },
            Task::BulkCheck { target_ids } => {
                match self.dispatcher.dispatch_subset(&target_ids).await? {
                    0 => TaskReport::NothingToCheck,
                    count => TaskReport::Queued { count },
                }
            }
            Task::Sweep => TaskReport::Swept {
                deleted: self.sweeper.sweep().await?,
            },
        };

        info!("{}", report);
        Ok(report)
    }
}
