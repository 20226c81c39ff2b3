//! 去皮 / 清皮 / 置零

use anyhow::{Context, Result, bail};
use clap::Args;
use std::path::Path;
use tote_sensor::WeightSensorClient;

use crate::utils::load_config;

#[derive(Args, Debug)]
pub struct TareCommand {
    /// 清除皮重
    #[arg(long, conflicts_with = "zero")]
    pub clear: bool,

    /// 置零（校准零点）
    #[arg(long)]
    pub zero: bool,
}

impl TareCommand {
    pub fn execute(&self, config_path: Option<&Path>) -> Result<()> {
        let (config, _) = load_config(config_path)?;
        let mut scale = config
            .sensor
            .to_builder()
            .build()
            .context("failed to open scale")?;
        let message = self.apply(scale.as_mut())?;
        println!("✅ {}", message);
        Ok(())
    }

    fn apply(&self, scale: &mut dyn WeightSensorClient) -> Result<String> {
        if self.zero {
            scale.set_zero().context("zero command failed")?;
            return Ok("scale zeroed".to_string());
        }
        if self.clear {
            scale.clear_tare().context("clear tare failed")?;
            return Ok("tare cleared".to_string());
        }
        if !scale.set_tare() {
            bail!("tare not acknowledged by {} scale", scale.variant());
        }
        match scale.read_tare_kg() {
            Ok(tare) => Ok(format!("tare set to {:.2} kg", tare)),
            Err(_) => Ok("tare set".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tote_sensor::SimulatedScale;

    #[test]
    fn test_tare_then_clear() {
        let mut scale = SimulatedScale::new(3.25);
        let tare = TareCommand {
            clear: false,
            zero: false,
        };
        assert_eq!(tare.apply(&mut scale).unwrap(), "tare set to 3.25 kg");

        let clear = TareCommand {
            clear: true,
            zero: false,
        };
        assert_eq!(clear.apply(&mut scale).unwrap(), "tare cleared");
        assert_eq!(scale.read_tare_kg().unwrap(), 0.0);
    }

    #[test]
    fn test_unreachable_scale_fails() {
        let mut scale = SimulatedScale::new(3.0);
        scale.handle().set_reachable(false);
        let tare = TareCommand {
            clear: false,
            zero: false,
        };
        assert!(tare.apply(&mut scale).is_err());
    }
}
