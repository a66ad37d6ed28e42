//! 服务管理模块
//!
//! 负责配置加载、组件装配以及前台运行的生命周期管理

use crate::config::{self, Config, ConfigLoader, TomlConfigLoader};
use crate::core::engine::MonitorEngine;
use crate::core::signal::{setup_signal_handlers, wait_for_shutdown};
use crate::health::model::MonitoredTarget;
use crate::health::probe::HttpProber;
use crate::health::recorder::TracingObserver;
use crate::health::scheduler::{IntervalScheduler, Scheduler};
use crate::queue::{TaskQueue, TaskReceiver, TokioTaskQueue, WorkerPool};
use crate::storage::{InMemoryStore, JsonFileStore, RecordStore, TargetRepository};
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// 等待执行中任务结束的最长时间
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// 目标仓库与记录存储
pub struct StoreHandles {
    /// 目标仓库
    pub targets: Arc<dyn TargetRepository>,
    /// 记录存储
    pub records: Arc<dyn RecordStore>,
}

impl StoreHandles {
    /// 按配置打开存储并写入配置中的目标
    ///
    /// 配置了 `data_file` 时使用JSON文件存储，否则使用内存存储。
    pub async fn open(config: &Config) -> Result<Self> {
        let targets: Vec<MonitoredTarget> =
            config.targets.iter().map(|target| target.to_target()).collect();

        match &config.global.data_file {
            Some(path) => {
                let store = JsonFileStore::open(path)
                    .await
                    .with_context(|| format!("打开存储文件失败: {}", path.display()))?;
                store.sync_targets(targets).await.context("同步监控目标失败")?;
                info!("使用文件存储: {}", store.path().display());
                let store = Arc::new(store);
                Ok(Self {
                    targets: store.clone(),
                    records: store,
                })
            }
            None => {
                let store = InMemoryStore::new();
                for target in targets {
                    store.upsert_target(target).await;
                }
                info!("使用内存存储，重启后历史记录不会保留");
                let store = Arc::new(store);
                Ok(Self {
                    targets: store.clone(),
                    records: store,
                })
            }
        }
    }
}

/// 服务组件结构
pub struct ServiceComponents {
    /// 监控引擎
    pub engine: Arc<MonitorEngine>,
    /// 任务队列
    pub queue: Arc<TokioTaskQueue>,
    /// 任务通道接收端，由工作池消费
    pub receiver: TaskReceiver,
}

/// 服务启动器
pub struct ServiceLauncher;

impl ServiceLauncher {
    /// 加载和验证配置
    ///
    /// # 参数
    /// * `config_path` - 配置文件路径
    /// * `interval` - 命令行覆盖的检测间隔
    /// * `max_concurrent` - 命令行覆盖的最大并发数
    pub async fn load_and_validate_config(
        config_path: &Path,
        interval: Option<u64>,
        max_concurrent: Option<usize>,
    ) -> Result<Config> {
        info!("加载配置文件: {}", config_path.display());

        let config_loader = TomlConfigLoader::new(true);
        let mut config = config_loader
            .load_from_file(config_path)
            .await
            .context("加载配置文件失败")?;

        // 应用命令行参数覆盖
        if let Some(interval) = interval {
            config.global.check_interval_seconds = interval;
        }
        if let Some(max_concurrent) = max_concurrent {
            config.global.max_concurrent_checks = max_concurrent;
        }

        config::validate_config(&config).map_err(|e| anyhow::anyhow!("配置验证失败: {}", e))?;

        info!("配置加载成功，共 {} 个监控目标", config.targets.len());
        Ok(config)
    }

    /// 初始化服务组件
    pub async fn initialize_service_components(config: &Config) -> Result<ServiceComponents> {
        info!("初始化服务组件...");

        let stores = StoreHandles::open(config).await?;
        let prober =
            Arc::new(HttpProber::new(&config.global.probe_settings()).context("创建HTTP探测器失败")?);
        let (queue, receiver) = TokioTaskQueue::new();
        let queue = Arc::new(queue);

        let engine = MonitorEngine::new(
            stores.targets,
            stores.records,
            prober,
            queue.clone() as Arc<dyn TaskQueue>,
        )
        .with_retry_policy(config.global.retry_policy())
        .with_dispatch_settings(config.global.dispatch_settings())
        .with_retention(config.global.retention())
        .with_history_limit(config.global.history_limit)
        .with_observer(Arc::new(TracingObserver));

        Ok(ServiceComponents {
            engine: Arc::new(engine),
            queue,
            receiver,
        })
    }

    /// 前台运行：启动工作池和定时调度器，直到收到关闭信号
    pub async fn run_foreground(config: Config) -> Result<()> {
        info!("以前台模式启动服务...");

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        setup_signal_handlers(shutdown_tx.clone())
            .await
            .context("设置信号处理器失败")?;

        let components = Self::initialize_service_components(&config).await?;
        Self::run_until_shutdown(&config, components, shutdown_tx, shutdown_rx).await
    }

    /// 运行服务主逻辑
    pub async fn run_until_shutdown(
        config: &Config,
        components: ServiceComponents,
        shutdown_tx: broadcast::Sender<()>,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<()> {
        let ServiceComponents {
            engine,
            queue,
            receiver,
        } = components;

        let pool = Arc::new(WorkerPool::new(engine, config.global.worker_config()));
        let pool_runner = Arc::clone(&pool);
        let pool_shutdown = shutdown_tx.subscribe();
        let pool_handle =
            tokio::spawn(async move { pool_runner.run(receiver, pool_shutdown).await });

        let scheduler = IntervalScheduler::new(queue, config.global.schedule_settings());
        scheduler.start().await.context("启动调度器失败")?;

        wait_for_shutdown(shutdown_rx).await;

        info!("收到关闭信号，正在停止服务...");
        if let Err(e) = scheduler.stop().await {
            error!("停止调度器失败: {}", e);
        }

        if let Err(e) = pool_handle.await {
            error!("工作池停止时出错: {}", e);
        }

        // 等待已开始的任务结束
        let stats = pool.stats();
        let deadline = tokio::time::Instant::now() + DRAIN_TIMEOUT;
        while stats.read().await.in_flight > 0 {
            if tokio::time::Instant::now() >= deadline {
                warn!("等待执行中任务超时，强制退出");
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        let stats = stats.read().await;
        info!(
            "服务已停止: 接收 {} 个任务，成功 {}，失败 {}",
            stats.received, stats.succeeded, stats.failed
        );
        if let Some(failure) = &stats.last_failure {
            warn!(
                "最后一次任务失败: {} at {} - {}",
                failure.kind, failure.at, failure.error
            );
        }

        Ok(())
    }
}
