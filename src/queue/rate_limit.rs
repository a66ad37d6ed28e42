//! 任务限速
//!
//! 速率以 `"30/m"` 形式表示，限速器把任务开始时间均匀地错开

use crate::error::DispatchError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::{info, warn};

/// 速率限制：`per` 时间内最多 `max` 次
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RateLimit {
    /// 最大次数
    pub max: u32,
    /// 时间窗口
    pub per: Duration,
}

impl RateLimit {
    /// 每分钟最多 `max` 次
    pub fn per_minute(max: u32) -> Self {
        Self {
            max,
            per: Duration::from_secs(60),
        }
    }

    /// 相邻两次开始之间的最小间隔
    pub fn interval(&self) -> Duration {
        self.per / self.max.max(1)
    }
}

impl FromStr for RateLimit {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DispatchError::InvalidRateLimit(s.to_string());

        let (count, unit) = s.trim().split_once('/').ok_or_else(invalid)?;
        let max: u32 = count.trim().parse().map_err(|_| invalid())?;
        if max == 0 {
            return Err(invalid());
        }

        let per = match unit.trim() {
            "s" => Duration::from_secs(1),
            "m" => Duration::from_secs(60),
            "h" => Duration::from_secs(3600),
            _ => return Err(invalid()),
        };

        Ok(Self { max, per })
    }
}

impl TryFrom<String> for RateLimit {
    type Error = DispatchError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RateLimit> for String {
    fn from(limit: RateLimit) -> Self {
        limit.to_string()
    }
}

impl std::fmt::Display for RateLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let unit = match self.per.as_secs() {
            1 => "s",
            3600 => "h",
            _ => "m",
        };
        write!(f, "{}/{}", self.max, unit)
    }
}

/// 时间槽状态
#[derive(Debug, Default)]
struct SlotState {
    /// 下一个可用时间槽
    next_slot: Option<Instant>,
    /// 当前是否处于积压告警状态
    backlogged: bool,
}

/// 限速器，保证相邻两次 `acquire` 返回的时间间隔不小于 `interval`
///
/// 到达速度持续高于限速时等待时间会不断增长，
/// 等待超过 `backlog_warning` 时记录一次告警，积压消退后再次恢复。
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    backlog_warning: Option<Duration>,
    state: Mutex<SlotState>,
}

impl RateLimiter {
    /// 创建新的限速器
    pub fn new(limit: RateLimit) -> Self {
        Self {
            interval: limit.interval(),
            backlog_warning: None,
            state: Mutex::new(SlotState::default()),
        }
    }

    /// 等待时间超过 `threshold` 时记录告警
    pub fn with_backlog_warning(mut self, threshold: Duration) -> Self {
        self.backlog_warning = Some(threshold);
        self
    }

    /// 等待下一个可用时间槽
    pub async fn acquire(&self) {
        let slot = self.reserve().await;
        sleep_until(slot).await;
    }

    /// 当前排队中的最后一个时间槽距现在的时长
    pub async fn backlog(&self) -> Duration {
        let state = self.state.lock().await;
        state
            .next_slot
            .map(|next| next.saturating_duration_since(Instant::now()))
            .unwrap_or(Duration::ZERO)
    }

    /// 是否处于积压告警状态
    pub async fn is_backlogged(&self) -> bool {
        self.state.lock().await.backlogged
    }

    /// 预留下一个时间槽
    async fn reserve(&self) -> Instant {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let slot = match state.next_slot {
            Some(next) if next > now => next,
            _ => now,
        };
        state.next_slot = Some(slot + self.interval);

        if let Some(threshold) = self.backlog_warning {
            let wait = slot - now;
            if wait > threshold && !state.backlogged {
                warn!(
                    "限速积压: 任务需等待 {:?}，超过阈值 {:?} (间隔 {:?})",
                    wait, threshold, self.interval
                );
                state.backlogged = true;
            } else if wait <= threshold && state.backlogged {
                info!("限速积压已消退: 任务等待 {:?}", wait);
                state.backlogged = false;
            }
        }

        slot
    }
}
