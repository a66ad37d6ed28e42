//! 命令处理逻辑
//!
//! 实现各种CLI命令的处理逻辑

use crate::cli::args::{Args, Commands, ConfigTemplate, OutputFormat};
use crate::config::{Config, ConfigLoader, TomlConfigLoader};
use crate::core::service::ServiceLauncher;
use crate::error::{MonitorError, Result};
use crate::health::model::{truncate_message, HealthCheckRecord, MonitoredTarget, TargetId};
use crate::health::probe::{HttpProber, ProbeOutcome, Prober};
use async_trait::async_trait;
use std::path::Path;

/// 命令处理器trait
#[async_trait]
pub trait Command: Send + Sync {
    /// 执行命令
    async fn execute(&self, args: &Args) -> Result<()>;
}

/// 按命令行选择并执行命令
pub async fn execute_command(args: &Args) -> Result<()> {
    let command: Box<dyn Command> = match &args.command {
        Commands::Start { .. } => Box::new(StartCommand),
        Commands::Check { .. } => Box::new(CheckCommand),
        Commands::Status { .. } => Box::new(StatusCommand),
        Commands::History { .. } => Box::new(HistoryCommand),
        Commands::Sweep => Box::new(SweepCommand),
        Commands::Init { .. } => Box::new(InitCommand),
        Commands::Validate { .. } => Box::new(ValidateCommand),
        Commands::Version { .. } => Box::new(VersionCommand),
    };
    command.execute(args).await
}

/// 加载配置文件
async fn load_config(args: &Args) -> Result<Config> {
    let loader = TomlConfigLoader::new(true);
    loader.load_from_file(args.get_config_path()).await
}

/// 版本命令
pub struct VersionCommand;

#[async_trait]
impl Command for VersionCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Version { format } = &args.command {
            match format {
                OutputFormat::Json => {
                    let version_info = serde_json::json!({
                        "name": crate::APP_NAME,
                        "version": crate::VERSION,
                        "description": crate::APP_DESCRIPTION
                    });
                    println!("{}", serde_json::to_string_pretty(&version_info)?);
                }
                OutputFormat::Text => {
                    println!("{} v{}", crate::APP_NAME, crate::VERSION);
                    println!("{}", crate::APP_DESCRIPTION);
                }
            }
        }
        Ok(())
    }
}

/// 初始化命令
pub struct InitCommand;

#[async_trait]
impl Command for InitCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Init {
            config_path,
            force,
            template,
        } = &args.command
        {
            self.create_config_file(config_path, *force, *template).await
        } else {
            Ok(())
        }
    }
}

impl InitCommand {
    /// 创建配置文件
    ///
    /// # 返回
    /// * `Result<bool>` - 是否写入了文件
    pub async fn create_config_file(
        &self,
        config_path: &Path,
        force: bool,
        template: ConfigTemplate,
    ) -> Result<()> {
        if config_path.exists() && !force {
            eprintln!("配置文件已存在: {}", config_path.display());
            eprintln!("使用 --force 参数覆盖现有文件");
            return Ok(());
        }

        if let Some(parent) = config_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        tokio::fs::write(config_path, Self::template_content(template)).await?;

        println!("配置文件已创建: {}", config_path.display());
        println!("请编辑配置文件以添加您的监控目标");

        Ok(())
    }

    /// 模板内容
    pub fn template_content(template: ConfigTemplate) -> &'static str {
        match template {
            ConfigTemplate::Minimal => include_str!("../../configs/minimal.toml"),
            ConfigTemplate::Full => include_str!("../../configs/full.toml"),
        }
    }
}

/// 验证命令
pub struct ValidateCommand;

#[async_trait]
impl Command for ValidateCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Validate {
            config_path,
            verbose,
        } = &args.command
        {
            let config_file = config_path
                .clone()
                .unwrap_or_else(|| args.get_config_path());

            self.validate_config_file(&config_file, *verbose).await
        } else {
            Ok(())
        }
    }
}

impl ValidateCommand {
    /// 验证配置文件
    async fn validate_config_file(&self, config_path: &Path, verbose: bool) -> Result<()> {
        println!("验证配置文件: {}", config_path.display());

        let loader = TomlConfigLoader::new(true);
        let config = loader.load_from_file(config_path).await?;
        let global = &config.global;

        if verbose {
            println!("配置验证通过！");
            println!("全局配置:");
            println!("  检测间隔: {}秒", global.check_interval_seconds);
            println!("  日志级别: {}", global.log_level);
            println!("  请求超时: {}秒", global.request_timeout_seconds);
            println!(
                "  重试: 最多 {} 次，退避基数 {}秒，网络错误重试: {}",
                global.max_retries,
                global.retry_backoff_seconds,
                if global.retry_network_errors { "是" } else { "否" }
            );
            println!(
                "  速率限制: 探测 {}，批量 {}",
                global.probe_rate_limit, global.bulk_rate_limit
            );
            println!(
                "  记录保留: {}天，每 {} 小时清理",
                global.retention_days, global.sweep_interval_hours
            );
            println!("  最大并发: {}", global.max_concurrent_checks);
            match &global.data_file {
                Some(path) => println!("  存储文件: {}", path.display()),
                None => println!("  存储: 内存"),
            }

            println!("监控目标:");
            for target in &config.targets {
                println!(
                    "  {}. {} ({}) {}",
                    target.id,
                    target.name,
                    target.url,
                    if target.active { "" } else { "[已停用]" }
                );
            }
        } else {
            println!("✓ 配置文件验证通过");
            println!("✓ 找到 {} 个监控目标", config.targets.len());
        }

        Ok(())
    }
}

/// 检测命令
pub struct CheckCommand;

#[async_trait]
impl Command for CheckCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Check { target, format } = &args.command {
            let config = load_config(args).await?;
            self.perform_check(&config, *target, *format).await
        } else {
            Ok(())
        }
    }
}

impl CheckCommand {
    /// 对目标执行一次探测，不重试也不写入记录
    async fn perform_check(
        &self,
        config: &Config,
        target_id: Option<TargetId>,
        format: OutputFormat,
    ) -> Result<()> {
        let targets: Vec<MonitoredTarget> = match target_id {
            Some(id) => {
                let target = config
                    .targets
                    .iter()
                    .find(|target| target.id == id)
                    .ok_or(MonitorError::TargetNotFound { id })?;
                vec![target.to_target()]
            }
            None => config
                .targets
                .iter()
                .filter(|target| target.active)
                .map(|target| target.to_target())
                .collect(),
        };

        if targets.is_empty() {
            eprintln!("未找到任何启用的监控目标");
            return Ok(());
        }

        let prober = HttpProber::new(&config.global.probe_settings())?;
        let outcomes = futures::future::join_all(
            targets.iter().map(|target| prober.probe(&target.url)),
        )
        .await;

        match format {
            OutputFormat::Json => {
                let results: Vec<_> = targets
                    .iter()
                    .zip(&outcomes)
                    .map(|(target, outcome)| {
                        serde_json::json!({
                            "target": target,
                            "healthy": outcome.is_healthy(),
                            "error_message": outcome.error_message(),
                            "outcome": outcome,
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&results)?);
            }
            OutputFormat::Text => {
                for (target, outcome) in targets.iter().zip(&outcomes) {
                    print_outcome(target, outcome);
                }
            }
        }

        Ok(())
    }
}

fn print_outcome(target: &MonitoredTarget, outcome: &ProbeOutcome) {
    let status_icon = if outcome.is_healthy() { "✓" } else { "✗" };
    let status_code = outcome
        .status_code()
        .map(|code| code.to_string())
        .unwrap_or_else(|| "N/A".to_string());
    println!(
        "{} {} - {} - {:.0}ms",
        status_icon,
        target,
        status_code,
        outcome.elapsed_seconds() * 1000.0
    );
    if let Some(error) = outcome.error_message() {
        println!("  错误: {error}");
    }
}

/// 启动命令
pub struct StartCommand;

#[async_trait]
impl Command for StartCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Start {
            interval,
            max_concurrent,
        } = &args.command
        {
            let config = ServiceLauncher::load_and_validate_config(
                &args.get_config_path(),
                *interval,
                *max_concurrent,
            )
            .await?;
            ServiceLauncher::run_foreground(config).await?;
        }
        Ok(())
    }
}

/// 状态命令
pub struct StatusCommand;

#[async_trait]
impl Command for StatusCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        let Commands::Status { format } = &args.command else {
            return Ok(());
        };

        let config = load_config(args).await?;
        let components = ServiceLauncher::initialize_service_components(&config).await?;
        let overview = components.engine.target_overview().await?;

        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&overview)?),
            OutputFormat::Text => {
                println!("🔍 URL Vitals 状态报告");
                println!(
                    "生成时间: {}",
                    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
                );
                println!();
                println!(
                    "{:<5} {:<24} {:<14} {:<6} {:<10} {:<20}",
                    "ID", "名称", "状态", "状态码", "响应时间", "最后检测时间"
                );
                println!("{}", "-".repeat(85));

                for entry in &overview {
                    let latest = entry.latest.as_ref();
                    println!(
                        "{:<5} {:<24} {:<14} {:<6} {:<10} {:<20}",
                        entry.target.id,
                        truncate_message(&entry.target.name, 24),
                        entry.status.to_string(),
                        latest
                            .and_then(|r| r.status_code)
                            .map(|c| c.to_string())
                            .unwrap_or_else(|| "N/A".to_string()),
                        format_response_time(latest),
                        latest
                            .map(|r| r.checked_at.format("%m-%d %H:%M:%S").to_string())
                            .unwrap_or_else(|| "-".to_string()),
                    );
                }

                let healthy = overview
                    .iter()
                    .filter(|entry| entry.latest.as_ref().is_some_and(|r| r.healthy))
                    .count();
                println!();
                println!("💡 健康目标: {}/{}", healthy, overview.len());
            }
        }

        Ok(())
    }
}

fn format_response_time(record: Option<&HealthCheckRecord>) -> String {
    record
        .and_then(|r| r.response_time)
        .map(|seconds| format!("{:.0}ms", seconds * 1000.0))
        .unwrap_or_else(|| "N/A".to_string())
}

/// 历史命令
pub struct HistoryCommand;

#[async_trait]
impl Command for HistoryCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        let Commands::History {
            target,
            limit,
            format,
        } = &args.command
        else {
            return Ok(());
        };

        let config = load_config(args).await?;
        let components = ServiceLauncher::initialize_service_components(&config).await?;
        let history = components.engine.target_history(*target, *limit).await?;

        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&history)?),
            OutputFormat::Text => {
                if history.is_empty() {
                    println!("Never checked");
                }
                for record in &history {
                    let state = if record.healthy { "Healthy" } else { "Unhealthy" };
                    println!(
                        "{} {:<9} {:<4} {:<8} {}",
                        record.checked_at.format("%Y-%m-%d %H:%M:%S"),
                        state,
                        record
                            .status_code
                            .map(|c| c.to_string())
                            .unwrap_or_else(|| "N/A".to_string()),
                        format_response_time(Some(record)),
                        record.error_message.as_deref().unwrap_or("")
                    );
                }
            }
        }

        Ok(())
    }
}

/// 清理命令
pub struct SweepCommand;

#[async_trait]
impl Command for SweepCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        let config = load_config(args).await?;
        let components = ServiceLauncher::initialize_service_components(&config).await?;
        let deleted = components.engine.sweep_now().await?;
        println!("Deleted {deleted} old health check records");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_init_writes_template_once() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("url-vitals.toml");

        InitCommand
            .create_config_file(&path, false, ConfigTemplate::Full)
            .await
            .unwrap();
        let written = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(written.contains("retry_network_errors"));

        // 已存在时不覆盖
        InitCommand
            .create_config_file(&path, false, ConfigTemplate::Minimal)
            .await
            .unwrap();
        let unchanged = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(unchanged, written);

        InitCommand
            .create_config_file(&path, true, ConfigTemplate::Minimal)
            .await
            .unwrap();
        let replaced = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(replaced, InitCommand::template_content(ConfigTemplate::Minimal));
    }

    #[tokio::test]
    async fn test_check_unknown_target_fails() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        tokio::fs::write(&path, InitCommand::template_content(ConfigTemplate::Minimal))
            .await
            .unwrap();

        let args = Args::try_parse_from([
            "url-vitals",
            "--config",
            path.to_str().unwrap(),
            "check",
            "99",
        ])
        .unwrap();

        let err = execute_command(&args).await.unwrap_err();
        assert_eq!(err.to_string(), "监控错误: URL with id 99 not found or inactive");
    }

    #[tokio::test]
    async fn test_sweep_with_file_store() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        let data_file = temp_dir.path().join("data.json");
        let content = format!(
            "[global]\ndata_file = {:?}\n\n{}",
            data_file.to_string_lossy(),
            InitCommand::template_content(ConfigTemplate::Minimal)
        );
        tokio::fs::write(&path, content).await.unwrap();

        let args =
            Args::try_parse_from(["url-vitals", "--config", path.to_str().unwrap(), "sweep"])
                .unwrap();
        assert!(execute_command(&args).await.is_ok());
        assert!(data_file.exists());
    }
}
