//! 单元测试辅助类型

use crate::error::DispatchError;
use crate::health::probe::{ProbeOutcome, Prober};
use crate::queue::{Task, TaskHandle, TaskQueue};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// 只记录派发请求、不执行任务的队列
#[derive(Default)]
pub struct RecordingQueue {
    scheduled: Mutex<Vec<(Task, Duration)>>,
    unavailable: AtomicBool,
    reject_targets: Vec<u64>,
}

impl RecordingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 对指定目标的探测派发返回错误
    pub fn rejecting(targets: Vec<u64>) -> Self {
        Self {
            reject_targets: targets,
            ..Default::default()
        }
    }

    /// 模拟工作池关闭
    pub fn set_unavailable(&self) {
        self.unavailable.store(true, Ordering::SeqCst);
    }

    pub async fn scheduled(&self) -> Vec<(Task, Duration)> {
        self.scheduled.lock().await.clone()
    }
}

#[async_trait]
impl TaskQueue for RecordingQueue {
    async fn schedule(&self, task: Task, delay: Duration) -> Result<TaskHandle, DispatchError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DispatchError::QueueUnavailable);
        }
        if let Task::Probe { target_id, .. } = &task {
            if self.reject_targets.contains(target_id) {
                return Err(DispatchError::QueueUnavailable);
            }
        }
        let handle = TaskHandle::new(task.kind(), delay);
        self.scheduled.lock().await.push((task, delay));
        Ok(handle)
    }
}

/// 按顺序返回预设结果的探测器，预设用完后重复最后一个
pub struct ScriptedProber {
    outcomes: Mutex<VecDeque<ProbeOutcome>>,
    last: ProbeOutcome,
    calls: Mutex<Vec<String>>,
}

impl ScriptedProber {
    pub fn new(outcomes: Vec<ProbeOutcome>) -> Self {
        let last = outcomes
            .last()
            .cloned()
            .unwrap_or(ProbeOutcome::Success {
                status_code: 200,
                elapsed_seconds: 0.1,
            });
        Self {
            outcomes: Mutex::new(outcomes.into()),
            last,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn always(outcome: ProbeOutcome) -> Self {
        Self::new(vec![outcome])
    }

    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn probe(&self, url: &str) -> ProbeOutcome {
        self.calls.lock().await.push(url.to_string());
        self.outcomes
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| self.last.clone())
    }
}
