//! 内存存储实现
//!
//! 目标和记录保存在进程内，适用于单进程运行和测试

use super::{RecordStore, StoreResult, TargetRepository};
use crate::error::StoreError;
use crate::health::model::{HealthCheckRecord, MonitoredTarget, RecordId, TargetId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// 存储快照，也是JSON文件的持久化格式
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// 监控目标
    #[serde(default)]
    pub targets: BTreeMap<TargetId, MonitoredTarget>,
    /// 健康检测记录（按插入顺序）
    #[serde(default)]
    pub records: Vec<HealthCheckRecord>,
}

impl StoreSnapshot {
    /// 插入或更新目标，保留已有的创建时间
    pub fn upsert_target(&mut self, mut target: MonitoredTarget) {
        if let Some(existing) = self.targets.get(&target.id) {
            target.created_at = existing.created_at;
        }
        self.targets.insert(target.id, target);
    }

    /// 插入记录，引用的目标必须存在
    pub fn insert_record(&mut self, record: HealthCheckRecord) -> StoreResult<RecordId> {
        if !self.targets.contains_key(&record.target_id) {
            return Err(StoreError::UnknownTarget {
                id: record.target_id,
            });
        }
        let id = record.id;
        self.records.push(record);
        Ok(id)
    }

    /// 删除早于截止时间的记录
    pub fn delete_older_than(&mut self, cutoff: DateTime<Utc>) -> u64 {
        let before = self.records.len();
        self.records.retain(|record| record.checked_at >= cutoff);
        (before - self.records.len()) as u64
    }

    /// 启用的目标，按创建时间倒序
    pub fn active_targets(&self) -> Vec<MonitoredTarget> {
        let mut targets: Vec<MonitoredTarget> = self
            .targets
            .values()
            .filter(|target| target.active)
            .cloned()
            .collect();
        sort_newest_first(&mut targets);
        targets
    }

    /// 全部目标，按创建时间倒序
    pub fn all_targets(&self) -> Vec<MonitoredTarget> {
        let mut targets: Vec<MonitoredTarget> = self.targets.values().cloned().collect();
        sort_newest_first(&mut targets);
        targets
    }

    /// 目标最新的记录，检测时间相同时取后插入的
    pub fn latest_for(&self, target_id: TargetId) -> Option<HealthCheckRecord> {
        self.records
            .iter()
            .filter(|record| record.target_id == target_id)
            .max_by_key(|record| record.checked_at)
            .cloned()
    }

    /// 按检测时间倒序列出目标的记录
    pub fn list_for(&self, target_id: TargetId, limit: usize) -> Vec<HealthCheckRecord> {
        let mut records: Vec<HealthCheckRecord> = self
            .records
            .iter()
            .rev()
            .filter(|record| record.target_id == target_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.checked_at.cmp(&a.checked_at));
        records.truncate(limit);
        records
    }
}

fn sort_newest_first(targets: &mut [MonitoredTarget]) {
    targets.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
}

/// 内存存储
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<StoreSnapshot>,
}

impl InMemoryStore {
    /// 创建空的内存存储
    pub fn new() -> Self {
        Self::default()
    }

    /// 从快照创建
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        Self {
            state: RwLock::new(snapshot),
        }
    }

    /// 添加新目标，自动分配ID
    pub async fn add_target(&self, name: &str, url: &str) -> MonitoredTarget {
        let mut state = self.state.write().await;
        let id = state.targets.keys().next_back().map_or(1, |last| last + 1);
        let target = MonitoredTarget::new(id, name, url);
        state.targets.insert(id, target.clone());
        target
    }

    /// 插入或更新目标
    pub async fn upsert_target(&self, target: MonitoredTarget) {
        self.state.write().await.upsert_target(target);
    }

    /// 修改目标的启用状态
    pub async fn set_active(&self, id: TargetId, active: bool) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let target = state
            .targets
            .get_mut(&id)
            .ok_or(StoreError::UnknownTarget { id })?;
        target.active = active;
        Ok(())
    }

    /// 记录总数
    pub async fn record_count(&self) -> usize {
        self.state.read().await.records.len()
    }

    /// 当前状态的快照
    pub async fn snapshot(&self) -> StoreSnapshot {
        self.state.read().await.clone()
    }
}

#[async_trait]
impl TargetRepository for InMemoryStore {
    async fn list_active_targets(&self) -> StoreResult<Vec<MonitoredTarget>> {
        Ok(self.state.read().await.active_targets())
    }

    async fn list_targets(&self) -> StoreResult<Vec<MonitoredTarget>> {
        Ok(self.state.read().await.all_targets())
    }

    async fn get_target(&self, id: TargetId) -> StoreResult<Option<MonitoredTarget>> {
        Ok(self.state.read().await.targets.get(&id).cloned())
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn insert(&self, record: HealthCheckRecord) -> StoreResult<RecordId> {
        self.state.write().await.insert_record(record)
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        Ok(self.state.write().await.delete_older_than(cutoff))
    }

    async fn latest_for(&self, target_id: TargetId) -> StoreResult<Option<HealthCheckRecord>> {
        Ok(self.state.read().await.latest_for(target_id))
    }

    async fn list_for(
        &self,
        target_id: TargetId,
        limit: usize,
    ) -> StoreResult<Vec<HealthCheckRecord>> {
        Ok(self.state.read().await.list_for(target_id, limit))
    }
}
