//! # Tote CLI
//!
//! 托盘加冰加水工位的命令行工具。
//!
//! ## 运行工位
//!
//! ```bash
//! # 无硬件演示（模拟秤 + 模拟阀门）
//! tote-cli run --simulate
//! tote> start
//! tote> id T-1001
//! tote> quit
//!
//! # 按配置文件连接秤并推送遥测
//! tote-cli --config station.toml run --batch-log batches.jsonl
//! ```
//!
//! ## 单次操作
//!
//! ```bash
//! tote-cli config init
//! tote-cli weigh -n 5 --detail
//! tote-cli tare --clear
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod modes;
mod plant;
mod utils;

use commands::{ConfigCommand, RunCommand, TareCommand, WeighCommand};

/// Tote CLI - 托盘加冰加水工位工具
#[derive(Parser, Debug)]
#[command(name = "tote-cli")]
#[command(about = "Command-line runner for tote fill stations", long_about = None)]
#[command(version)]
struct Cli {
    /// 配置文件（默认 <config_dir>/tote/station.toml）
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 运行工位控制循环
    Run {
        #[command(flatten)]
        args: RunCommand,
    },

    /// 读取秤的重量
    Weigh {
        #[command(flatten)]
        args: WeighCommand,
    },

    /// 去皮 / 清皮 / 置零
    Tare {
        #[command(flatten)]
        args: TareCommand,
    },

    /// 配置管理
    #[command(subcommand)]
    Config(ConfigCommand),
}

fn main() -> Result<()> {
    // 日志输出到 stderr，stdout 留给命令结果
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("tote_cli=info,tote_station=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Run { args } => args.execute(config),
        Commands::Weigh { args } => args.execute(config),
        Commands::Tare { args } => args.execute(config),
        Commands::Config(cmd) => cmd.execute(config),
    }
}
