//! 重试控制器
//!
//! 以显式状态机描述一个探测周期：`Attempting(n)` → `Succeeded` / `Failed`。
//! 状态机只根据探测结果返回下一步动作，重新派发由任务层完成。

use crate::health::probe::ProbeOutcome;
use std::time::Duration;

/// 探测周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    /// 正在进行第 n 次尝试（从0开始）
    Attempting(u32),
    /// 终态：目标健康
    Succeeded,
    /// 终态：目标不健康或重试耗尽
    Failed,
}

impl CycleState {
    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CycleState::Attempting(_))
    }
}

/// 状态机给出的下一步动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStep {
    /// 在 `delay` 之后重新派发第 `next_attempt` 次尝试
    Retry { next_attempt: u32, delay: Duration },
    /// 记录当前结果并结束周期
    Terminal(CycleState),
}

/// 重试策略
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// 最大重试次数
    pub max_retries: u32,
    /// 退避基数，第 n 次失败后等待 `base_backoff * (n + 1)`
    pub base_backoff: Duration,
    /// 是否对超时、TLS、连接失败也进行重试
    pub retry_network_errors: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff: Duration::from_secs(60),
            retry_network_errors: false,
        }
    }
}

impl RetryPolicy {
    /// 第 `attempt` 次尝试失败后的退避时间
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_backoff.saturating_mul(attempt.saturating_add(1))
    }

    /// 判断结果是否可重试
    pub fn is_retryable(&self, outcome: &ProbeOutcome) -> bool {
        outcome.is_request_error() || (self.retry_network_errors && outcome.is_network_failure())
    }

    /// 根据第 `attempt` 次尝试的结果计算下一步
    ///
    /// # 参数
    /// * `attempt` - 当前尝试序号（0 为首次）
    /// * `outcome` - 本次探测结果
    ///
    /// # 返回
    /// * `CycleStep` - 重试或终态
    pub fn evaluate(&self, attempt: u32, outcome: &ProbeOutcome) -> CycleStep {
        if self.is_retryable(outcome) && attempt < self.max_retries {
            return CycleStep::Retry {
                next_attempt: attempt + 1,
                delay: self.backoff(attempt),
            };
        }

        if outcome.is_healthy() {
            CycleStep::Terminal(CycleState::Succeeded)
        } else {
            CycleStep::Terminal(CycleState::Failed)
        }
    }
}

/// 单个探测周期的状态机，按顺序驱动每次尝试
#[derive(Debug, Clone)]
pub struct ProbeCycle {
    policy: RetryPolicy,
    state: CycleState,
}

impl ProbeCycle {
    /// 从首次尝试开始一个新的周期
    pub fn new(policy: RetryPolicy) -> Self {
        Self::resume(policy, 0)
    }

    /// 从第 `attempt` 次尝试恢复周期（重新派发的任务使用）
    pub fn resume(policy: RetryPolicy, attempt: u32) -> Self {
        Self {
            policy,
            state: CycleState::Attempting(attempt),
        }
    }

    /// 当前状态
    pub fn state(&self) -> CycleState {
        self.state
    }

    /// 输入本次尝试的结果，推进状态
    ///
    /// 已处于终态时保持不变并返回该终态。
    pub fn advance(&mut self, outcome: &ProbeOutcome) -> CycleStep {
        let attempt = match self.state {
            CycleState::Attempting(n) => n,
            terminal => return CycleStep::Terminal(terminal),
        };

        let step = self.policy.evaluate(attempt, outcome);
        self.state = match step {
            CycleStep::Retry { next_attempt, .. } => CycleState::Attempting(next_attempt),
            CycleStep::Terminal(state) => state,
        };
        step
    }
}
