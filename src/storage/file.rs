//! JSON文件存储实现
//!
//! 状态保存在内存中，每次修改后整体写入快照文件。写入先落到临时文件再重命名，
//! 写入失败时内存状态不变。
//!
//! 同一个文件可能被多个进程使用（例如运行中的服务和一次性的 `sweep` 命令）。
//! 修改期间持有 `<文件>.lock` 上的建议锁，并在锁内重新加载文件后再修改。

use super::memory::StoreSnapshot;
use super::{RecordStore, StoreResult, TargetRepository};
use crate::error::StoreError;
use crate::health::model::{HealthCheckRecord, MonitoredTarget, RecordId, TargetId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// 等待文件锁的最长时间
const LOCK_TIMEOUT: Duration = Duration::from_secs(10);
const INITIAL_LOCK_RETRY_DELAY: Duration = Duration::from_millis(10);
const MAX_LOCK_RETRY_DELAY: Duration = Duration::from_millis(500);

/// 文件锁守卫，文件句柄关闭时锁自动释放
#[derive(Debug)]
struct FileLockGuard {
    _file: std::fs::File,
}

/// JSON文件存储
#[derive(Debug)]
pub struct JsonFileStore {
    /// 快照文件路径
    path: PathBuf,
    /// 建议锁文件路径
    lock_path: PathBuf,
    /// 当前状态
    state: RwLock<StoreSnapshot>,
}

impl JsonFileStore {
    /// 打开存储文件，文件不存在时从空状态开始
    ///
    /// # 参数
    /// * `path` - 快照文件路径
    ///
    /// # 返回
    /// * `StoreResult<Self>` - 存储实例
    pub async fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let lock_path = path.with_extension("json.lock");

        let snapshot = if let Some(snapshot) = load_snapshot(&path).await? {
            info!(
                "已加载存储文件 {}: {} 个目标, {} 条记录",
                path.display(),
                snapshot.targets.len(),
                snapshot.records.len()
            );
            snapshot
        } else {
            debug!("存储文件不存在，使用空状态: {}", path.display());
            StoreSnapshot::default()
        };

        Ok(Self {
            path,
            lock_path,
            state: RwLock::new(snapshot),
        })
    }

    /// 存储文件路径
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 用配置中的目标同步目标仓库（插入或更新，不删除）
    pub async fn sync_targets(&self, targets: Vec<MonitoredTarget>) -> StoreResult<()> {
        self.mutate(|snapshot| {
            for target in targets {
                snapshot.upsert_target(target);
            }
            Ok(())
        })
        .await
    }

    /// 在状态副本上执行修改，写盘成功后才替换当前状态
    ///
    /// 持有文件锁期间先从文件重新加载，其他进程的修改不会被覆盖。
    async fn mutate<T, F>(&self, change: F) -> StoreResult<T>
    where
        F: FnOnce(&mut StoreSnapshot) -> StoreResult<T> + Send,
        T: Send,
    {
        let mut state = self.state.write().await;
        let _lock = self.acquire_file_lock().await?;

        if let Some(on_disk) = load_snapshot(&self.path).await? {
            *state = on_disk;
        }

        let mut next = state.clone();
        let value = change(&mut next)?;
        self.persist(&next).await?;
        *state = next;
        Ok(value)
    }

    /// 获取建议锁，锁被占用时退避重试
    async fn acquire_file_lock(&self) -> StoreResult<FileLockGuard> {
        if let Some(parent) = self.lock_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| StoreError::Persistence(format!("创建存储目录失败: {e}")))?;
            }
        }

        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)
            .await
            .map_err(|e| StoreError::Persistence(format!("打开锁文件失败: {e}")))?
            .into_std()
            .await;

        let start = Instant::now();
        let mut retry_delay = INITIAL_LOCK_RETRY_DELAY;
        let mut warned = false;

        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(FileLockGuard { _file: file }),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    let elapsed = start.elapsed();
                    if elapsed >= LOCK_TIMEOUT {
                        return Err(StoreError::Persistence(format!(
                            "等待存储文件锁超时: {}",
                            self.lock_path.display()
                        )));
                    }
                    if !warned && elapsed >= Duration::from_secs(2) {
                        warn!("存储文件锁被占用，等待中: {}", self.lock_path.display());
                        warned = true;
                    }
                    tokio::time::sleep(retry_delay).await;
                    retry_delay = (retry_delay * 2).min(MAX_LOCK_RETRY_DELAY);
                }
                Err(e) => {
                    return Err(StoreError::Persistence(format!("获取存储文件锁失败: {e}")));
                }
            }
        }
    }

    /// 原子地写入快照文件
    async fn persist(&self, snapshot: &StoreSnapshot) -> StoreResult<()> {
        let json_data = serde_json::to_string_pretty(snapshot)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| StoreError::Persistence(format!("创建存储目录失败: {e}")))?;
            }
        }

        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, json_data)
            .await
            .map_err(|e| StoreError::Persistence(format!("写入临时文件失败: {e}")))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| StoreError::Persistence(format!("替换存储文件失败: {e}")))?;

        Ok(())
    }
}

/// 读取快照文件，文件不存在时返回 `None`
async fn load_snapshot(path: &Path) -> StoreResult<Option<StoreSnapshot>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(StoreError::Persistence(format!("读取存储文件失败: {e}")));
        }
    };
    Ok(Some(serde_json::from_str(&content)?))
}

#[async_trait]
impl TargetRepository for JsonFileStore {
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
impl RecordStore for JsonFileStore {
    async fn insert(&self, record: HealthCheckRecord) -> StoreResult<RecordId> {
        self.mutate(|snapshot| snapshot.insert_record(record)).await
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        self.mutate(|snapshot| Ok(snapshot.delete_older_than(cutoff)))
            .await
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::probe::ProbeOutcome;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.json");

        let store = JsonFileStore::open(&path).await.unwrap();
        store
            .sync_targets(vec![MonitoredTarget::new(1, "Test Site", "https://example.com")])
            .await
            .unwrap();
        let record = HealthCheckRecord::from_outcome(
            1,
            &ProbeOutcome::Success {
                status_code: 200,
                elapsed_seconds: 0.2,
            },
            Utc::now(),
        );
        let id = store.insert(record).await.unwrap();
        assert!(path.exists());

        let reopened = JsonFileStore::open(&path).await.unwrap();
        let latest = reopened.latest_for(1).await.unwrap().unwrap();
        assert_eq!(latest.id, id);
        assert_eq!(latest.status_code, Some(200));
        assert_eq!(reopened.list_targets().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_insert_leaves_state_untouched() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::open(dir.path().join("data.json")).await.unwrap();

        let record = HealthCheckRecord::from_outcome(
            9,
            &ProbeOutcome::ConnectionError { elapsed_seconds: 0.1 },
            Utc::now(),
        );
        let result = store.insert(record).await;

        assert!(matches!(result, Err(StoreError::UnknownTarget { id: 9 })));
        assert!(store.latest_for(9).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_open_rejects_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, "{not json").unwrap();

        let result = JsonFileStore::open(&path).await;
        assert!(matches!(result, Err(StoreError::Serialization(_))));
    }

    #[tokio::test]
    async fn test_sweep_from_second_store_is_not_overwritten() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.json");
        let now = Utc::now();
        let outcome = ProbeOutcome::Success {
            status_code: 200,
            elapsed_seconds: 0.2,
        };

        let service = JsonFileStore::open(&path).await.unwrap();
        service
            .sync_targets(vec![MonitoredTarget::new(1, "Test Site", "https://example.com")])
            .await
            .unwrap();
        service
            .insert(HealthCheckRecord::from_outcome(
                1,
                &outcome,
                now - chrono::Duration::days(5),
            ))
            .await
            .unwrap();

        // 另一个进程（例如 sweep 命令）清理同一个文件
        let one_shot = JsonFileStore::open(&path).await.unwrap();
        let cutoff = now - chrono::Duration::days(3);
        assert_eq!(one_shot.delete_older_than(cutoff).await.unwrap(), 1);

        service
            .insert(HealthCheckRecord::from_outcome(1, &outcome, now))
            .await
            .unwrap();

        let reopened = JsonFileStore::open(&path).await.unwrap();
        let history = reopened.list_for(1, 50).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].checked_at, now);
        assert_eq!(service.list_for(1, 50).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_targets_added_elsewhere_are_kept() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.json");

        let first = JsonFileStore::open(&path).await.unwrap();
        let second = JsonFileStore::open(&path).await.unwrap();

        first
            .sync_targets(vec![MonitoredTarget::new(1, "One", "https://one.example.com")])
            .await
            .unwrap();
        second
            .sync_targets(vec![MonitoredTarget::new(2, "Two", "https://two.example.com")])
            .await
            .unwrap();

        let reopened = JsonFileStore::open(&path).await.unwrap();
        assert_eq!(reopened.list_targets().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_lock_is_released_after_mutation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.json");

        let store = JsonFileStore::open(&path).await.unwrap();
        store
            .sync_targets(vec![MonitoredTarget::new(1, "One", "https://one.example.com")])
            .await
            .unwrap();

        let lock_file = std::fs::OpenOptions::new()
            .write(true)
            .open(dir.path().join("data.json.lock"))
            .unwrap();
        assert!(lock_file.try_lock_exclusive().is_ok());
    }
}
