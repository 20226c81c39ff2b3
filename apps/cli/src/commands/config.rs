//! 配置管理命令

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use std::fs;
use std::path::{Path, PathBuf};
use tote_station::StationConfig;

use crate::utils::{default_config_path, describe_source, load_config};

/// 配置命令
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 输出生效的配置（TOML）
    Show,

    /// 校验配置文件
    Check,

    /// 写出默认配置
    Init {
        /// 目标路径（默认 <config_dir>/tote/station.toml）
        #[arg(long)]
        path: Option<PathBuf>,

        /// 覆盖已有文件
        #[arg(long)]
        force: bool,
    },
}

impl ConfigCommand {
    pub fn execute(&self, config_path: Option<&Path>) -> Result<()> {
        match self {
            ConfigCommand::Show => Self::show(config_path),
            ConfigCommand::Check => Self::check(config_path),
            ConfigCommand::Init { path, force } => Self::init(path.as_deref(), *force),
        }
    }

    fn show(config_path: Option<&Path>) -> Result<()> {
        let (config, source) = load_config(config_path)?;
        println!("# source: {}", describe_source(source.as_deref()));
        print!("{}", config.to_toml_string()?);
        Ok(())
    }

    fn check(config_path: Option<&Path>) -> Result<()> {
        let (config, source) = load_config(config_path)?;
        config.validate()?;
        println!("✅ config OK ({})", describe_source(source.as_deref()));
        Ok(())
    }

    fn init(path: Option<&Path>, force: bool) -> Result<()> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => default_config_path()
                .ok_or_else(|| anyhow::anyhow!("cannot determine config directory"))?,
        };
        if path.exists() && !force {
            bail!(
                "{} already exists (use --force to overwrite)",
                path.display()
            );
        }
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let text = StationConfig::default().to_toml_string()?;
        fs::write(&path, text).with_context(|| format!("failed to write {}", path.display()))?;
        println!("✅ wrote {}", path.display());
        Ok(())
    }
}
