//! 读取重量

use anyhow::{Context, Result, bail};
use clap::Args;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tote_sensor::{SensorMetrics, WeightSample, WeightSensorClient};

use crate::utils::load_config;

#[derive(Args, Debug)]
pub struct WeighCommand {
    /// 读取次数
    #[arg(short = 'n', long, default_value_t = 1)]
    pub count: u32,

    /// 两次读取的间隔（毫秒）
    #[arg(long, default_value_t = 500)]
    pub interval_ms: u64,

    /// 同时读取净重、皮重和稳定标志
    #[arg(long)]
    pub detail: bool,

    /// 每次读取输出一行 JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct Reading {
    gross_kg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    net_kg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tare_kg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'static str>,
}

impl WeighCommand {
    pub fn execute(&self, config_path: Option<&Path>) -> Result<()> {
        let (config, _) = load_config(config_path)?;
        let metrics = Arc::new(SensorMetrics::new());
        let mut scale = config
            .sensor
            .to_builder()
            .metrics(Arc::clone(&metrics))
            .build()
            .context("failed to open scale")?;

        let mut ok = 0;
        for i in 0..self.count.max(1) {
            if i > 0 {
                thread::sleep(Duration::from_millis(self.interval_ms));
            }
            let reading = self.read(scale.as_mut());
            if reading.gross_kg.is_some() {
                ok += 1;
            }
            if self.json {
                println!("{}", serde_json::to_string(&reading)?);
            } else {
                println!("{}", format_reading(&reading));
            }
        }

        let snapshot = metrics.snapshot();
        if snapshot.transactions > 0 && !self.json {
            println!(
                "{} transactions, {:.1}% failed",
                snapshot.transactions,
                snapshot.failure_rate()
            );
        }
        if ok == 0 {
            bail!("no valid reading from {} scale", scale.variant());
        }
        Ok(())
    }

    fn read(&self, scale: &mut dyn WeightSensorClient) -> Reading {
        let gross = scale.read_gross_weight_kg();
        let mut reading = Reading {
            gross_kg: gross.kg(),
            net_kg: None,
            tare_kg: None,
            stable: None,
            error: gross.failure().map(|f| f.as_str()),
        };
        if self.detail {
            if let WeightSample::Kg(net) = scale.read_net_weight_kg() {
                reading.net_kg = Some(net);
            }
            reading.tare_kg = scale.read_tare_kg().ok();
            reading.stable = scale.is_weight_stable().ok();
        }
        reading
    }
}

fn format_reading(reading: &Reading) -> String {
    let mut line = match (reading.gross_kg, reading.error) {
        (Some(kg), _) => format!("gross {:.2} kg", kg),
        (None, Some(error)) => format!("read failed: {}", error),
        (None, None) => "read failed".to_string(),
    };
    if let Some(net) = reading.net_kg {
        line.push_str(&format!(", net {:.2} kg", net));
    }
    if let Some(tare) = reading.tare_kg {
        line.push_str(&format!(", tare {:.2} kg", tare));
    }
    if let Some(stable) = reading.stable {
        line.push_str(if stable { ", stable" } else { ", settling" });
    }
    line
}
