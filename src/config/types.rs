//! 配置数据结构定义
//!
//! 定义应用程序的配置结构体、默认值、验证逻辑以及到各组件参数的转换

use crate::health::dispatcher::DispatchSettings;
use crate::health::model::{MonitoredTarget, TargetId};
use crate::health::probe::{ProbeSettings, DEFAULT_ACCEPT, DEFAULT_USER_AGENT};
use crate::health::retry::RetryPolicy;
use crate::health::scheduler::ScheduleSettings;
use crate::queue::rate_limit::RateLimit;
use crate::queue::worker::WorkerConfig;
use crate::queue::TaskKind;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

/// 主配置结构，包含全局配置和目标列表
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// 全局配置项
    #[serde(default)]
    pub global: GlobalConfig,
    /// 监控目标列表
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

/// 全局配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GlobalConfig {
    /// 批量检测间隔（秒）
    #[serde(default = "default_check_interval")]
    pub check_interval_seconds: u64,
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// 请求超时时间（秒）
    #[serde(default = "default_timeout")]
    pub request_timeout_seconds: u64,
    /// 探测请求的 User-Agent
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// 探测请求的 Accept 请求头
    #[serde(default = "default_accept")]
    pub accept: String,
    /// 最大重定向次数
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    /// 最大重试次数
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// 重试退避基数（秒）
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_seconds: u64,
    /// 是否对超时、TLS、连接失败重试
    #[serde(default)]
    pub retry_network_errors: bool,
    /// 探测任务速率限制
    #[serde(default = "default_probe_rate_limit")]
    pub probe_rate_limit: RateLimit,
    /// 手动批量检测速率限制
    #[serde(default = "default_bulk_rate_limit")]
    pub bulk_rate_limit: RateLimit,
    /// 定时批量检测的错开间隔（秒）
    #[serde(default = "default_batch_stagger")]
    pub batch_stagger_seconds: u64,
    /// 手动批量检测的错开间隔（秒）
    #[serde(default = "default_bulk_stagger")]
    pub bulk_stagger_seconds: u64,
    /// 记录保留天数
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// 记录清理间隔（小时）
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_hours: u64,
    /// 最大并发检测数
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_checks: usize,
    /// 历史记录默认条数
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// 存储文件路径，未设置时使用内存存储
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_file: Option<PathBuf>,
}

/// 监控目标配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TargetConfig {
    /// 目标ID
    pub id: TargetId,
    /// 显示名称
    pub name: String,
    /// 目标URL
    pub url: String,
    /// 是否启用
    #[serde(default = "default_active")]
    pub active: bool,
}

impl TargetConfig {
    /// 转换为监控目标
    pub fn to_target(&self) -> MonitoredTarget {
        MonitoredTarget::new(self.id, self.name.clone(), self.url.clone()).with_active(self.active)
    }
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            check_interval_seconds: default_check_interval(),
            log_level: default_log_level(),
            request_timeout_seconds: default_timeout(),
            user_agent: default_user_agent(),
            accept: default_accept(),
            max_redirects: default_max_redirects(),
            max_retries: default_max_retries(),
            retry_backoff_seconds: default_retry_backoff(),
            retry_network_errors: false,
            probe_rate_limit: default_probe_rate_limit(),
            bulk_rate_limit: default_bulk_rate_limit(),
            batch_stagger_seconds: default_batch_stagger(),
            bulk_stagger_seconds: default_bulk_stagger(),
            retention_days: default_retention_days(),
            sweep_interval_hours: default_sweep_interval(),
            max_concurrent_checks: default_max_concurrent(),
            history_limit: default_history_limit(),
            data_file: None,
        }
    }
}

impl GlobalConfig {
    /// 探测请求参数
    pub fn probe_settings(&self) -> ProbeSettings {
        ProbeSettings {
            timeout: Duration::from_secs(self.request_timeout_seconds),
            user_agent: self.user_agent.clone(),
            accept: self.accept.clone(),
            max_redirects: self.max_redirects,
        }
    }

    /// 重试策略
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_backoff: Duration::from_secs(self.retry_backoff_seconds),
            retry_network_errors: self.retry_network_errors,
        }
    }

    /// 工作池配置
    pub fn worker_config(&self) -> WorkerConfig {
        let mut rate_limits = HashMap::new();
        rate_limits.insert(TaskKind::Probe, self.probe_rate_limit);
        rate_limits.insert(TaskKind::BulkCheck, self.bulk_rate_limit);
        WorkerConfig {
            max_concurrent: self.max_concurrent_checks,
            rate_limits,
            backlog_warn_after: Duration::from_secs(self.check_interval_seconds),
        }
    }

    /// 派发错开间隔
    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            batch_stagger: Duration::from_secs(self.batch_stagger_seconds),
            bulk_stagger: Duration::from_secs(self.bulk_stagger_seconds),
        }
    }

    /// 调度间隔
    pub fn schedule_settings(&self) -> ScheduleSettings {
        ScheduleSettings {
            check_interval: Duration::from_secs(self.check_interval_seconds),
            sweep_interval: Duration::from_secs(self.sweep_interval_hours.saturating_mul(3600)),
        }
    }

    /// 记录保留窗口，超出可表示范围时取最大值
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::try_days(i64::from(self.retention_days))
            .unwrap_or(chrono::Duration::MAX)
    }
}

/// 记录保留天数上限（约十年）
pub const MAX_RETENTION_DAYS: u32 = 3650;

/// 记录清理间隔上限（一年）
pub const MAX_SWEEP_INTERVAL_HOURS: u64 = 8760;

// 默认值函数
fn default_check_interval() -> u64 {
    300
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_timeout() -> u64 {
    30
}
fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}
fn default_accept() -> String {
    DEFAULT_ACCEPT.to_string()
}
fn default_max_redirects() -> usize {
    10
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_backoff() -> u64 {
    60
}
fn default_probe_rate_limit() -> RateLimit {
    RateLimit::per_minute(30)
}
fn default_bulk_rate_limit() -> RateLimit {
    RateLimit::per_minute(5)
}
fn default_batch_stagger() -> u64 {
    2
}
fn default_bulk_stagger() -> u64 {
    1
}
fn default_retention_days() -> u32 {
    3
}
fn default_sweep_interval() -> u64 {
    24
}
fn default_max_concurrent() -> usize {
    50
}
fn default_history_limit() -> usize {
    50
}
fn default_active() -> bool {
    true
}

/// 配置验证函数
///
/// # 参数
/// * `config` - 要验证的配置
///
/// # 返回
/// * `Result<(), String>` - 验证结果，错误时返回错误信息
pub fn validate_config(config: &Config) -> Result<(), String> {
    let global = &config.global;

    if global.check_interval_seconds == 0 {
        return Err("检测间隔不能为0".to_string());
    }

    if global.request_timeout_seconds == 0 {
        return Err("请求超时时间不能为0".to_string());
    }

    if global.max_concurrent_checks == 0 {
        return Err("最大并发检测数不能为0".to_string());
    }

    if global.retention_days == 0 {
        return Err("记录保留天数不能为0".to_string());
    }

    if global.retention_days > MAX_RETENTION_DAYS {
        return Err(format!(
            "记录保留天数不能超过{}: {}",
            MAX_RETENTION_DAYS, global.retention_days
        ));
    }

    if global.sweep_interval_hours == 0 {
        return Err("记录清理间隔不能为0".to_string());
    }

    if global.sweep_interval_hours > MAX_SWEEP_INTERVAL_HOURS {
        return Err(format!(
            "记录清理间隔不能超过{}小时: {}",
            MAX_SWEEP_INTERVAL_HOURS, global.sweep_interval_hours
        ));
    }

    if global.history_limit == 0 {
        return Err("历史记录条数不能为0".to_string());
    }

    if global.user_agent.trim().is_empty() {
        return Err("User-Agent不能为空".to_string());
    }

    // 验证日志级别
    let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_log_levels.contains(&global.log_level.as_str()) {
        return Err(format!(
            "无效的日志级别: {}，支持的级别: {:?}",
            global.log_level, valid_log_levels
        ));
    }

    // 验证目标配置
    let mut seen_ids = HashSet::new();
    for target in &config.targets {
        if !seen_ids.insert(target.id) {
            return Err(format!("目标ID重复: {}", target.id));
        }

        if target.name.trim().is_empty() {
            return Err(format!("目标 {} 的名称不能为空", target.id));
        }

        if !target.url.starts_with("http://") && !target.url.starts_with("https://") {
            return Err(format!("目标 {} 的URL格式无效", target.name));
        }
    }

    Ok(())
}
