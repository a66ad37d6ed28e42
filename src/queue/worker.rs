//! 基于tokio的任务队列和工作池
//!
//! `TokioTaskQueue` 只负责把任务投递到通道；`WorkerPool` 消费通道，
//! 每个任务在独立的tokio任务中等待延迟、按类型限速、获取并发许可后执行。

use super::rate_limit::{RateLimit, RateLimiter};
use super::{Task, TaskExecutor, TaskHandle, TaskKind, TaskQueue};
use crate::error::DispatchError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, RwLock, Semaphore};
use tracing::{debug, error, info, warn};

/// 通道中的任务
#[derive(Debug)]
struct QueuedTask {
    handle: TaskHandle,
    task: Task,
    delay: Duration,
}

/// 任务通道的接收端，由工作池持有
pub struct TaskReceiver {
    receiver: mpsc::UnboundedReceiver<QueuedTask>,
}

/// 基于tokio通道的任务队列
#[derive(Clone)]
pub struct TokioTaskQueue {
    sender: mpsc::UnboundedSender<QueuedTask>,
}

impl TokioTaskQueue {
    /// 创建任务队列及其接收端
    pub fn new() -> (Self, TaskReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, TaskReceiver { receiver })
    }

    /// 工作池是否已关闭
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

#[async_trait]
impl TaskQueue for TokioTaskQueue {
    async fn schedule(&self, task: Task, delay: Duration) -> Result<TaskHandle, DispatchError> {
        let handle = TaskHandle::new(task.kind(), delay);
        self.sender
            .send(QueuedTask {
                handle: handle.clone(),
                task,
                delay,
            })
            .map_err(|_| DispatchError::QueueUnavailable)?;
        Ok(handle)
    }
}

/// 工作池配置
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// 最大并发执行数
    pub max_concurrent: usize,
    /// 按任务类型的速率限制
    pub rate_limits: HashMap<TaskKind, RateLimit>,
    /// 限速等待超过该时长时记录积压告警
    pub backlog_warn_after: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        let mut rate_limits = HashMap::new();
        rate_limits.insert(TaskKind::Probe, RateLimit::per_minute(30));
        rate_limits.insert(TaskKind::BulkCheck, RateLimit::per_minute(5));
        Self {
            max_concurrent: 50,
            rate_limits,
            backlog_warn_after: Duration::from_secs(300),
        }
    }
}

/// 工作池统计信息
#[derive(Debug, Clone, Default)]
pub struct WorkerStats {
    /// 已接收任务数
    pub received: u64,
    /// 执行成功数
    pub succeeded: u64,
    /// 执行失败数
    pub failed: u64,
    /// 正在执行的任务数
    pub in_flight: usize,
    /// 按类型统计的失败次数
    pub failures_by_kind: HashMap<TaskKind, u64>,
    /// 最后一次失败
    pub last_failure: Option<TaskFailure>,
}

/// 任务失败信息
#[derive(Debug, Clone)]
pub struct TaskFailure {
    /// 任务类型
    pub kind: TaskKind,
    /// 错误信息
    pub error: String,
    /// 失败时间
    pub at: DateTime<Utc>,
}

/// 工作池
pub struct WorkerPool {
    /// 任务执行器
    executor: Arc<dyn TaskExecutor>,
    /// 并发控制信号量
    semaphore: Arc<Semaphore>,
    /// 按类型的限速器
    limiters: Arc<HashMap<TaskKind, Arc<RateLimiter>>>,
    /// 统计信息
    stats: Arc<RwLock<WorkerStats>>,
}

impl WorkerPool {
    /// 创建新的工作池
    ///
    /// # 参数
    /// * `executor` - 任务执行器
    /// * `config` - 工作池配置
    ///
    /// # 返回
    /// * `Self` - 工作池实例
    pub fn new(executor: Arc<dyn TaskExecutor>, config: WorkerConfig) -> Self {
        let limiters = config
            .rate_limits
            .iter()
            .map(|(kind, limit)| {
                let limiter =
                    RateLimiter::new(*limit).with_backlog_warning(config.backlog_warn_after);
                (*kind, Arc::new(limiter))
            })
            .collect();

        Self {
            executor,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            limiters: Arc::new(limiters),
            stats: Arc::new(RwLock::new(WorkerStats::default())),
        }
    }

    /// 统计信息句柄
    pub fn stats(&self) -> Arc<RwLock<WorkerStats>> {
        Arc::clone(&self.stats)
    }

    /// 消费任务通道，直到收到关闭信号或所有发送端被丢弃
    ///
    /// 返回后接收端被丢弃，之后的 `schedule` 返回 `QueueUnavailable`。
    pub async fn run(&self, receiver: TaskReceiver, mut shutdown: broadcast::Receiver<()>) {
        let mut receiver = receiver.receiver;
        info!("工作池已启动");

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("工作池收到关闭信号");
                    break;
                }
                queued = receiver.recv() => match queued {
                    Some(queued) => self.spawn_task(queued).await,
                    None => {
                        debug!("任务通道已关闭");
                        break;
                    }
                },
            }
        }

        receiver.close();
        info!("工作池已停止");
    }

    /// 在独立任务中执行
    async fn spawn_task(&self, queued: QueuedTask) {
        let QueuedTask {
            handle,
            task,
            delay,
        } = queued;

        self.stats.write().await.received += 1;

        let executor = Arc::clone(&self.executor);
        let semaphore = Arc::clone(&self.semaphore);
        let limiter = self.limiters.get(&handle.kind).cloned();
        let stats = Arc::clone(&self.stats);

        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            // 限速等待不占用并发许可
            if let Some(limiter) = limiter {
                limiter.acquire().await;
            }

            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    warn!("获取并发许可失败，丢弃任务: {} ({})", handle.id, handle.kind);
                    return;
                }
            };

            stats.write().await.in_flight += 1;
            debug!("开始执行任务: {} ({})", handle.id, handle.kind);

            let result = executor.execute(task).await;

            let mut stats = stats.write().await;
            stats.in_flight = stats.in_flight.saturating_sub(1);
            match result {
                Ok(report) => {
                    stats.succeeded += 1;
                    debug!("任务完成: {} ({}) - {}", handle.id, handle.kind, report);
                }
                Err(e) => {
                    stats.failed += 1;
                    *stats.failures_by_kind.entry(handle.kind).or_insert(0) += 1;
                    stats.last_failure = Some(TaskFailure {
                        kind: handle.kind,
                        error: e.to_string(),
                        at: Utc::now(),
                    });
                    error!("任务执行失败: {} ({}) - {}", handle.id, handle.kind, e);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{MonitorError, Result, StoreError};
    use crate::queue::TaskReport;
    use tokio::sync::Mutex;
    use tokio::time::Instant;

    /// 记录执行时间的执行器
    #[derive(Default)]
    struct RecordingExecutor {
        executed: Mutex<Vec<(Task, Instant)>>,
    }

    #[async_trait]
    impl TaskExecutor for RecordingExecutor {
        async fn execute(&self, task: Task) -> Result<TaskReport> {
            let failing = matches!(task, Task::Sweep);
            self.executed.lock().await.push((task, Instant::now()));
            if failing {
                return Err(MonitorError::SweepFailed(StoreError::Persistence(
                    "disk full".to_string(),
                ))
                .into());
            }
            Ok(TaskReport::Queued { count: 0 })
        }
    }

    fn start_pool(
        executor: Arc<RecordingExecutor>,
        config: WorkerConfig,
    ) -> (TokioTaskQueue, Arc<WorkerPool>, broadcast::Sender<()>) {
        let (queue, receiver) = TokioTaskQueue::new();
        let pool = Arc::new(WorkerPool::new(executor, config));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let runner = Arc::clone(&pool);
        tokio::spawn(async move { runner.run(receiver, shutdown_rx).await });
        (queue, pool, shutdown_tx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_task_runs_after_delay() {
        let executor = Arc::new(RecordingExecutor::default());
        let (queue, _pool, _shutdown) = start_pool(Arc::clone(&executor), WorkerConfig::default());
        let start = Instant::now();

        queue
            .schedule(Task::BatchCheck, Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert!(executor.executed.lock().await.is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        let executed = executor.executed.lock().await;
        assert_eq!(executed.len(), 1);
        assert!(executed[0].1 - start >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_tasks_are_rate_limited() {
        let executor = Arc::new(RecordingExecutor::default());
        let (queue, _pool, _shutdown) = start_pool(Arc::clone(&executor), WorkerConfig::default());

        for id in 1..=3 {
            queue.schedule(Task::probe(id), Duration::ZERO).await.unwrap();
        }

        tokio::time::sleep(Duration::from_secs(10)).await;
        let executed = executor.executed.lock().await;
        assert_eq!(executed.len(), 3);

        let mut times: Vec<Instant> = executed.iter().map(|(_, at)| *at).collect();
        times.sort();
        assert!(times[1] - times[0] >= Duration::from_secs(2));
        assert!(times[2] - times[1] >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_counted() {
        let executor = Arc::new(RecordingExecutor::default());
        let (queue, pool, _shutdown) = start_pool(Arc::clone(&executor), WorkerConfig::default());

        queue.schedule(Task::Sweep, Duration::ZERO).await.unwrap();
        queue.schedule(Task::BatchCheck, Duration::ZERO).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        let stats = pool.stats();
        let stats = stats.read().await;
        assert_eq!(stats.received, 2);
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.failures_by_kind.get(&TaskKind::Sweep), Some(&1));
        assert_eq!(stats.last_failure.as_ref().map(|f| f.kind), Some(TaskKind::Sweep));
    }

    #[tokio::test]
    async fn test_schedule_fails_after_shutdown() {
        let executor = Arc::new(RecordingExecutor::default());
        let (queue, _pool, shutdown) = start_pool(executor, WorkerConfig::default());

        shutdown.send(()).unwrap();
        // 等待工作池退出并丢弃接收端
        for _ in 0..100 {
            if queue.is_closed() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let result = queue.schedule(Task::BatchCheck, Duration::ZERO).await;
        assert_eq!(result, Err(DispatchError::QueueUnavailable));
    }
}
