//! 监控目标与健康检测记录数据结构
//!
//! 定义被监控的URL目标、不可变的健康检测记录以及状态摘要

use crate::health::probe::ProbeOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 监控目标ID
pub type TargetId = u64;

/// 健康检测记录ID
pub type RecordId = Uuid;

/// 错误信息的最大字符数（存储大小限制）
pub const MAX_ERROR_MESSAGE_CHARS: usize = 100;

/// 被监控的URL目标
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredTarget {
    /// 目标ID
    pub id: TargetId,
    /// 显示名称
    pub name: String,
    /// 目标URL
    pub url: String,
    /// 是否启用
    pub active: bool,
    /// 创建时间
    pub created_at: DateTime<Utc>,
}

impl MonitoredTarget {
    /// 创建新的监控目标
    pub fn new(id: TargetId, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            url: url.into(),
            active: true,
            created_at: Utc::now(),
        }
    }

    /// 设置启用状态
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }
}

impl std::fmt::Display for MonitoredTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.name, self.url)
    }
}

/// 健康检测记录
///
/// 每个探测周期到达终态时创建一次，创建后不再修改，只由清理任务删除。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckRecord {
    /// 记录ID
    pub id: RecordId,
    /// 所属目标ID
    pub target_id: TargetId,
    /// HTTP状态码（非HTTP失败时为空）
    pub status_code: Option<u16>,
    /// 响应时间（秒）
    pub response_time: Option<f64>,
    /// 检测时间
    pub checked_at: DateTime<Utc>,
    /// 是否健康
    pub healthy: bool,
    /// 错误信息（最多100个字符）
    pub error_message: Option<String>,
}

impl HealthCheckRecord {
    /// 根据探测结果构建记录
    ///
    /// `healthy` 只由状态码推导：状态码存在且位于 [200, 400) 区间。
    pub fn from_outcome(
        target_id: TargetId,
        outcome: &ProbeOutcome,
        checked_at: DateTime<Utc>,
    ) -> Self {
        let status_code = outcome.status_code();
        Self {
            id: Uuid::new_v4(),
            target_id,
            status_code,
            response_time: Some(outcome.elapsed_seconds()),
            checked_at,
            healthy: is_healthy_status(status_code),
            error_message: outcome.error_message(),
        }
    }

    /// 生成 `名称 - 状态码 - 检测时间` 格式的描述
    pub fn describe(&self, target: &MonitoredTarget) -> String {
        let status = self
            .status_code
            .map(|code| code.to_string())
            .unwrap_or_else(|| "None".to_string());
        format!("{} - {} - {}", target.name, status, self.checked_at)
    }
}

/// 判断状态码是否代表健康
pub fn is_healthy_status(status_code: Option<u16>) -> bool {
    status_code.is_some_and(|code| (200..400).contains(&code))
}

/// 按字符截断错误信息
pub fn truncate_message(message: &str, max_chars: usize) -> String {
    message.chars().take(max_chars).collect()
}

/// 目标状态摘要
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusSummary {
    /// 从未检测
    NeverChecked,
    /// 最近一次检测健康
    Healthy,
    /// 最近一次检测不健康
    Unhealthy,
}

impl StatusSummary {
    /// 根据最新记录推导状态摘要
    pub fn from_latest(latest: Option<&HealthCheckRecord>) -> Self {
        match latest {
            None => StatusSummary::NeverChecked,
            Some(record) if record.healthy => StatusSummary::Healthy,
            Some(_) => StatusSummary::Unhealthy,
        }
    }
}

impl std::fmt::Display for StatusSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusSummary::NeverChecked => write!(f, "Never checked"),
            StatusSummary::Healthy => write!(f, "Healthy"),
            StatusSummary::Unhealthy => write!(f, "Unhealthy"),
        }
    }
}

/// 目标概览（目标 + 最新记录 + 状态摘要）
#[derive(Debug, Clone, Serialize)]
pub struct TargetOverview {
    /// 目标
    pub target: MonitoredTarget,
    /// 最新检测记录
    pub latest: Option<HealthCheckRecord>,
    /// 状态摘要
    pub status: StatusSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_display() {
        let target = MonitoredTarget::new(1, "Test Site", "https://example.com");
        assert_eq!(target.to_string(), "Test Site - https://example.com");
        assert!(target.active);
    }

    #[test]
    fn test_healthy_status_range() {
        assert!(is_healthy_status(Some(200)));
        assert!(is_healthy_status(Some(301)));
        assert!(is_healthy_status(Some(399)));
        assert!(!is_healthy_status(Some(199)));
        assert!(!is_healthy_status(Some(400)));
        assert!(!is_healthy_status(Some(503)));
        assert!(!is_healthy_status(None));
    }

    #[test]
    fn test_truncate_message_counts_chars() {
        let long = "x".repeat(250);
        assert_eq!(truncate_message(&long, MAX_ERROR_MESSAGE_CHARS).len(), 100);

        // 多字节字符不能被截断在中间
        let wide = "错".repeat(120);
        let truncated = truncate_message(&wide, MAX_ERROR_MESSAGE_CHARS);
        assert_eq!(truncated.chars().count(), 100);

        assert_eq!(truncate_message("short", 100), "short");
    }

    #[test]
    fn test_record_from_success_outcome() {
        let outcome = ProbeOutcome::Success {
            status_code: 200,
            elapsed_seconds: 0.25,
        };
        let record = HealthCheckRecord::from_outcome(7, &outcome, Utc::now());

        assert_eq!(record.target_id, 7);
        assert_eq!(record.status_code, Some(200));
        assert_eq!(record.response_time, Some(0.25));
        assert!(record.healthy);
        assert!(record.error_message.is_none());
    }

    #[test]
    fn test_record_from_server_error_is_unhealthy() {
        let outcome = ProbeOutcome::Success {
            status_code: 500,
            elapsed_seconds: 0.1,
        };
        let record = HealthCheckRecord::from_outcome(1, &outcome, Utc::now());

        assert_eq!(record.status_code, Some(500));
        assert!(!record.healthy);
        assert!(record.error_message.is_none());
    }

    #[test]
    fn test_record_from_connection_error() {
        let outcome = ProbeOutcome::ConnectionError {
            elapsed_seconds: 0.01,
        };
        let record = HealthCheckRecord::from_outcome(1, &outcome, Utc::now());

        assert_eq!(record.status_code, None);
        assert!(!record.healthy);
        assert_eq!(record.error_message.as_deref(), Some("Connection failed"));
    }

    #[test]
    fn test_record_describe() {
        let target = MonitoredTarget::new(1, "Test Site", "https://example.com");
        let outcome = ProbeOutcome::Success {
            status_code: 200,
            elapsed_seconds: 0.5,
        };
        let record = HealthCheckRecord::from_outcome(1, &outcome, Utc::now());

        assert_eq!(
            record.describe(&target),
            format!("Test Site - 200 - {}", record.checked_at)
        );
    }

    #[test]
    fn test_status_summary() {
        assert_eq!(StatusSummary::from_latest(None), StatusSummary::NeverChecked);
        assert_eq!(StatusSummary::NeverChecked.to_string(), "Never checked");

        let healthy = HealthCheckRecord::from_outcome(
            1,
            &ProbeOutcome::Success {
                status_code: 204,
                elapsed_seconds: 0.1,
            },
            Utc::now(),
        );
        assert_eq!(
            StatusSummary::from_latest(Some(&healthy)),
            StatusSummary::Healthy
        );

        let unhealthy = HealthCheckRecord::from_outcome(
            1,
            &ProbeOutcome::Timeout {
                elapsed_seconds: 30.0,
            },
            Utc::now(),
        );
        assert_eq!(
            StatusSummary::from_latest(Some(&unhealthy)),
            StatusSummary::Unhealthy
        );
        assert_eq!(StatusSummary::Unhealthy.to_string(), "Unhealthy");
    }
}
