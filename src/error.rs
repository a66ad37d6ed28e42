//! 错误处理模块
//!
//! 定义应用程序的统一错误类型

use crate::health::model::TargetId;
use thiserror::Error;

/// URL Vitals 应用程序的主要错误类型
#[derive(Error, Debug)]
pub enum UrlVitalsError {
    /// 配置相关错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    /// 存储相关错误
    #[error("存储错误: {0}")]
    Store(#[from] StoreError),

    /// 任务派发相关错误
    #[error("任务派发错误: {0}")]
    Dispatch(#[from] DispatchError),

    /// 监控核心错误
    #[error("监控错误: {0}")]
    Monitor(#[from] MonitorError),

    /// IO错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON序列化/反序列化错误
    #[error("JSON错误: {0}")]
    Json(#[from] serde_json::Error),

    /// 其他错误
    #[error("其他错误: {0}")]
    Other(#[from] anyhow::Error),
}

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 配置文件解析错误
    #[error("配置文件解析失败: {0}")]
    ParseError(String),

    /// 配置验证错误
    #[error("配置验证失败: {0}")]
    ValidationError(String),

    /// 配置文件不存在
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    /// 环境变量替换错误
    #[error("环境变量替换失败: {var}")]
    EnvVarError { var: String },
}

/// 存储错误类型
#[derive(Error, Debug)]
pub enum StoreError {
    /// 记录引用的目标不存在
    #[error("目标不存在: {id}")]
    UnknownTarget { id: TargetId },

    /// 持久化失败
    #[error("持久化失败: {0}")]
    Persistence(String),

    /// 快照序列化失败
    #[error("快照序列化失败: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// 任务派发错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// 任务队列不可用（工作池已关闭）
    #[error("任务队列不可用")]
    QueueUnavailable,

    /// 无效的速率限制表达式
    #[error("无效的速率限制: {0}")]
    InvalidRateLimit(String),
}

/// 监控核心错误类型
#[derive(Error, Debug)]
pub enum MonitorError {
    /// 目标不存在或未启用
    #[error("URL with id {id} not found or inactive")]
    TargetNotFound { id: TargetId },

    /// 清理任务失败，整个清理视为失败
    #[error("清理历史记录失败: {0}")]
    SweepFailed(#[source] StoreError),

    /// 保留窗口超出可表示的时间范围
    #[error("保留窗口超出时间范围: {retention}")]
    RetentionOutOfRange { retention: chrono::Duration },

    /// HTTP客户端构建失败
    #[error("HTTP客户端构建失败: {0}")]
    ClientBuild(#[from] reqwest::Error),
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, UrlVitalsError>;
