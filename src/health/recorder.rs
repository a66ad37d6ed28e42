//! 结果记录器
//!
//! 把终态探测结果写成不可变的健康检测记录。写入失败只记录日志，不中断探测流程。

use crate::health::model::{HealthCheckRecord, MonitoredTarget, RecordId};
use crate::health::probe::ProbeOutcome;
use crate::storage::RecordStore;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info};

/// 记录观察者，每写入一条记录通知一次
pub trait ProbeObserver: Send + Sync {
    /// 记录已保存
    fn on_record(&self, target: &MonitoredTarget, record: &HealthCheckRecord);
}

/// 以结构化日志输出记录的观察者
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ProbeObserver for TracingObserver {
    fn on_record(&self, target: &MonitoredTarget, record: &HealthCheckRecord) {
        info!(
            target: "health_check",
            target_id = target.id,
            target_name = %target.name,
            status_code = ?record.status_code,
            response_time = ?record.response_time,
            healthy = record.healthy,
            error = record.error_message.as_deref().unwrap_or(""),
            "HEALTH: {} - {}",
            target.name,
            if record.healthy { "healthy" } else { "unhealthy" }
        );
    }
}

/// 结果记录器
pub struct ResultRecorder {
    /// 记录存储
    store: Arc<dyn RecordStore>,
    /// 观察者列表
    observers: Vec<Arc<dyn ProbeObserver>>,
}

impl ResultRecorder {
    /// 创建新的结果记录器
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            observers: Vec::new(),
        }
    }

    /// 添加观察者
    pub fn with_observer(mut self, observer: Arc<dyn ProbeObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// 保存一条终态记录
    ///
    /// # 参数
    /// * `target` - 监控目标
    /// * `outcome` - 终态探测结果
    ///
    /// # 返回
    /// * `Option<RecordId>` - 保存成功时的记录ID，失败时为 `None`
    pub async fn record(
        &self,
        target: &MonitoredTarget,
        outcome: &ProbeOutcome,
    ) -> Option<RecordId> {
        let record = HealthCheckRecord::from_outcome(target.id, outcome, Utc::now());

        match self.store.insert(record.clone()).await {
            Ok(id) => {
                debug!("Saved health check {} for {}", id, target.name);
                for observer in &self.observers {
                    observer.on_record(target, &record);
                }
                Some(id)
            }
            Err(e) => {
                error!("保存健康检测记录失败 {}: {}", target.name, e);
                None
            }
        }
    }
}
