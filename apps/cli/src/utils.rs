//! 配置定位与公共输出格式

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tote_station::{StationConfig, StationStatus};

/// 默认配置文件：`<config_dir>/tote/station.toml`
pub fn default_config_path() -> Option<PathBuf> {
    let mut path = dirs::config_dir()?;
    path.push("tote");
    path.push("station.toml");
    Some(path)
}

/// 加载配置
///
/// 显式路径必须存在；否则尝试默认路径，都没有时使用内置默认值。
/// 返回配置及其来源路径。
pub fn load_config(explicit: Option<&Path>) -> Result<(StationConfig, Option<PathBuf>)> {
    if let Some(path) = explicit {
        let config = StationConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?;
        return Ok((config, Some(path.to_path_buf())));
    }
    match default_config_path() {
        Some(path) if path.exists() => {
            let config = StationConfig::load(&path)
                .with_context(|| format!("failed to load config {}", path.display()))?;
            Ok((config, Some(path)))
        },
        _ => Ok((StationConfig::default(), None)),
    }
}

pub fn describe_source(source: Option<&Path>) -> String {
    match source {
        Some(path) => path.display().to_string(),
        None => "built-in defaults".to_string(),
    }
}

/// 单行状态摘要
pub fn format_status(status: &StationStatus) -> String {
    let weight = status
        .last_weight_kg
        .map(|kg| format!("{:.2} kg", kg))
        .unwrap_or_else(|| "-".to_string());
    let batch = &status.batch;
    let mut line = format!(
        "{} | weight {} | fish {:.2} kg | ice {} | water {}",
        status.state,
        weight,
        batch.fish_kg,
        optional_kg(batch.ice_out_kg()),
        optional_kg(batch.water_out_kg()),
    );
    if let Some(id) = &batch.id {
        line.push_str(&format!(" | tote {}", id));
    }
    if let Some(lot) = &batch.lot_number {
        line.push_str(&format!(" | lot {}", lot));
    }
    if let Some(fault) = status.sensor_fault {
        line.push_str(&format!(" | scale {}", fault));
    }
    if status.paused {
        line.push_str(" | paused");
    }
    if status.manual_override {
        line.push_str(" | manual");
    }
    line
}

fn optional_kg(kg: Option<f64>) -> String {
    kg.map(|kg| format!("{:.2} kg", kg))
        .unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tote_station::ToteFillState;

    #[test]
    fn test_format_status() {
        let mut status = StationStatus {
            state: ToteFillState::DispensingWater,
            last_weight_kg: Some(13.456),
            paused: true,
            ..StationStatus::default()
        };
        status.batch.fish_kg = 10.0;
        status.batch.lot_number = Some("LOT-3".into());

        let line = format_status(&status);
        assert_eq!(
            line,
            "DISPENSING_WATER | weight 13.46 kg | fish 10.00 kg | ice - | water - | lot LOT-3 | paused"
        );
    }

    #[test]
    fn test_missing_explicit_config_fails() {
        let err = load_config(Some(Path::new("/nonexistent/tote.toml"))).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/tote.toml"));
    }
}
