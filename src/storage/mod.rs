//! 存储模块
//!
//! 定义监控目标仓库和健康检测记录存储的抽象接口，并提供内存与JSON文件实现

pub mod file;
pub mod memory;

use crate::error::StoreError;
use crate::health::model::{HealthCheckRecord, MonitoredTarget, RecordId, TargetId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

// 重新导出主要类型
pub use file::JsonFileStore;
pub use memory::InMemoryStore;

/// 存储结果类型别名
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// 监控目标仓库，由管理层拥有，核心只读
#[async_trait]
pub trait TargetRepository: Send + Sync {
    /// 列出所有启用的目标
    async fn list_active_targets(&self) -> StoreResult<Vec<MonitoredTarget>>;

    /// 列出所有目标，按创建时间倒序
    async fn list_targets(&self) -> StoreResult<Vec<MonitoredTarget>>;

    /// 按ID获取目标（不存在时返回 `None`）
    async fn get_target(&self, id: TargetId) -> StoreResult<Option<MonitoredTarget>>;
}

/// 健康检测记录存储
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// 原子地插入一条记录，目标必须存在
    async fn insert(&self, record: HealthCheckRecord) -> StoreResult<RecordId>;

    /// 删除 `checked_at < cutoff` 的所有记录，返回删除数量
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> StoreResult<u64>;

    /// 获取目标最新的一条记录
    async fn latest_for(&self, target_id: TargetId) -> StoreResult<Option<HealthCheckRecord>>;

    /// 按检测时间倒序列出目标的记录
    async fn list_for(
        &self,
        target_id: TargetId,
        limit: usize,
    ) -> StoreResult<Vec<HealthCheckRecord>>;
}
