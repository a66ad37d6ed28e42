//! URL Vitals 主程序入口
//!
//! URL健康监控工具

use anyhow::{Context, Result};
use clap::Parser;
use log::LevelFilter;
use tracing::{error, info};
use url_vitals::cli::args::{Args, Commands};
use url_vitals::cli::execute_command;
use url_vitals::config::{ConfigLoader, TomlConfigLoader};
use url_vitals::logging::{parse_level, LogConfig, LoggingSystem};

#[tokio::main]
async fn main() -> Result<()> {
    // 解析命令行参数
    let args = Args::parse();

    // 初始化日志系统
    let log_config = LogConfig::default()
        .with_level(resolve_log_level(&args).await)
        .with_json_format(args.json_logs);

    let _logging_system = LoggingSystem::setup_logging(log_config).context("初始化日志系统失败")?;

    info!("URL Vitals v{} 启动", url_vitals::VERSION);

    // 执行命令
    if let Err(e) = execute_command(&args).await {
        error!("命令执行失败: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// 确定日志级别：命令行参数优先，其次是配置文件，最后默认 info
async fn resolve_log_level(args: &Args) -> LevelFilter {
    if let Some(level) = args.log_level {
        return level.into();
    }

    // 这些命令不依赖配置文件
    if matches!(
        args.command,
        Commands::Init { .. } | Commands::Version { .. }
    ) {
        return LevelFilter::Info;
    }

    let loader = TomlConfigLoader::new(true);
    match loader.load_from_file(args.get_config_path()).await {
        Ok(config) => parse_level(&config.global.log_level).unwrap_or(LevelFilter::Info),
        // 日志系统尚未初始化，错误留给命令本身报告
        Err(_) => LevelFilter::Info,
    }
}
