//! 运行工位
//!
//! 控制循环在独立线程运行，主线程等待控制台输入、Ctrl+C 和控制循环结束。

use anyhow::{Context, Result};
use clap::Args;
use crossbeam_channel::{Receiver, bounded, never, select};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tote_sensor::{SensorMetrics, SharedSensor, SimulatedScale, WeightSensorClient};
use tote_station::telemetry::TelemetryStats;
use tote_station::{
    BatchSink, ChannelSink, DigitalOutputs, FanOutSink, JsonLinesBatchSink, LogBatchSink, LogSink,
    MemoryOutputs, RunnerConfig, SensorConfig, StationRunner, TelemetrySettings,
    TelemetryWorker, ToteFillOrchestrator,
};
use tote_transport::TcpLineClient;
use tracing::{info, warn};

use crate::modes::console::{self, ConsoleInput, Flow};
use crate::plant::{FlowRates, SimulatedPlant};
use crate::utils::{describe_source, format_status, load_config};

/// 遥测事件通道容量
const TELEMETRY_QUEUE: usize = 256;

/// 运行参数
#[derive(Args, Debug)]
pub struct RunCommand {
    /// 使用模拟秤和模拟阀门（无需硬件）
    #[arg(long)]
    pub simulate: bool,

    /// 完成的批次追加写入 JSON Lines 文件
    #[arg(long, value_name = "PATH")]
    pub batch_log: Option<PathBuf>,

    /// 不启动控制台（由遥测或信号控制）
    #[arg(long)]
    pub no_console: bool,

    /// 运行指定周期数后退出
    #[arg(long, value_name = "N")]
    pub max_ticks: Option<usize>,
}

impl RunCommand {
    pub fn execute(&self, config_path: Option<&Path>) -> Result<()> {
        let (mut config, source) = load_config(config_path)?;
        info!("Config: {}", describe_source(source.as_deref()));

        if self.simulate && !matches!(config.sensor, SensorConfig::Simulated { .. }) {
            config.sensor = SensorConfig::Simulated { initial_kg: 0.0 };
        }

        let metrics = Arc::new(SensorMetrics::new());
        let plant_stop = Arc::new(AtomicBool::new(false));
        let (sensor, outputs, plant): (
            Box<dyn WeightSensorClient>,
            Box<dyn DigitalOutputs>,
            Option<SimulatedPlant>,
        ) = match &config.sensor {
            SensorConfig::Simulated { initial_kg } => {
                let scale = SimulatedScale::new(*initial_kg);
                let plant = SimulatedPlant::new(scale.handle(), FlowRates::default());
                (
                    Box::new(scale) as Box<dyn WeightSensorClient>,
                    Box::new(plant.clone()) as Box<dyn DigitalOutputs>,
                    Some(plant),
                )
            },
            sensor => {
                let scale = sensor
                    .to_builder()
                    .metrics(Arc::clone(&metrics))
                    .build()
                    .context("failed to open scale")?;
                warn!("No digital output driver configured, valve lines are logged only");
                (
                    scale,
                    Box::new(MemoryOutputs::new()) as Box<dyn DigitalOutputs>,
                    None,
                )
            },
        };

        // 控制台与控制循环共用同一个传感器实例
        let scale = SharedSensor::new(sensor);

        let mut events = FanOutSink::new().with(LogSink);
        let telemetry_rx = match &config.telemetry.address {
            Some(_) => {
                let (tx, rx) = bounded(TELEMETRY_QUEUE);
                events = events.with(ChannelSink::new(tx));
                Some(rx)
            },
            None => None,
        };

        let orchestrator = ToteFillOrchestrator::builder(Box::new(scale.clone()), outputs)
            .fill(config.fill.clone())
            .timing(config.timing.clone())
            .events(events)
            .batch_sink(self.batch_sink()?)
            .build()?;

        let (runner, station) = StationRunner::new(
            orchestrator,
            RunnerConfig {
                tick_interval: config.timing.tick_interval(),
                max_iterations: self.max_ticks,
                ..RunnerConfig::default()
            },
        );

        let telemetry = match (&config.telemetry.address, telemetry_rx) {
            (Some(address), Some(rx)) => {
                let settings = TelemetrySettings::from(&config.telemetry);
                let link = TcpLineClient::new(address.clone(), Duration::from_secs(2));
                info!("Telemetry to {} as station '{}'", address, settings.station);
                Some(
                    TelemetryWorker::new(link, settings, rx)
                        .with_commands(station.command_sender())
                        .spawn()
                        .context("failed to start telemetry")?,
                )
            },
            _ => None,
        };

        let feeder = plant.map(|plant| plant.spawn(Arc::clone(&plant_stop)));

        let (signal_tx, signal_rx) = bounded(1);
        ctrlc::set_handler(move || {
            let _ = signal_tx.try_send(());
        })
        .context("failed to install Ctrl+C handler")?;

        let (done_tx, done_rx) = bounded(1);
        let worker = thread::Builder::new()
            .name("tote-station".to_string())
            .spawn(move || {
                let result = runner.run();
                let _ = done_tx.send(());
                result
            })
            .context("failed to start station thread")?;

        let mut input: Receiver<ConsoleInput> = if self.no_console {
            never()
        } else {
            console::spawn_input()?
        };

        loop {
            select! {
                recv(input) -> message => {
                    let message = message.unwrap_or(ConsoleInput::Closed);
                    if console::handle_input(message, &station, &scale) == Flow::Quit {
                        // 输入线程已退出，之后只等待控制循环结束
                        input = never();
                    }
                },
                recv(signal_rx) -> _ => {
                    eprintln!("\n🛑 Ctrl+C received, closing valves...");
                    let _ = station.shutdown();
                },
                recv(done_rx) -> _ => break,
            }
        }

        let orchestrator = match worker.join() {
            Ok(result) => result?,
            Err(_) => anyhow::bail!("station thread panicked"),
        };

        plant_stop.store(true, Ordering::Relaxed);
        if let Some(feeder) = feeder {
            let _ = feeder.join();
        }
        if let Some(telemetry) = telemetry {
            let stats = telemetry.stats();
            telemetry.shutdown();
            print_telemetry(&stats);
        }

        println!("{}", format_status(&orchestrator.status()));
        let snapshot = metrics.snapshot();
        if snapshot.transactions > 0 {
            println!(
                "Scale: {} transactions, {} ok, {:.1}% failed",
                snapshot.transactions,
                snapshot.weight_reads_ok,
                snapshot.failure_rate()
            );
        }
        Ok(())
    }

    fn batch_sink(&self) -> Result<Box<dyn BatchSink>> {
        match &self.batch_log {
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .with_context(|| format!("failed to open batch log {}", path.display()))?;
                info!("Writing batches to {}", path.display());
                Ok(Box::new(JsonLinesBatchSink::new(file)))
            },
            None => Ok(Box::new(LogBatchSink)),
        }
    }
}

fn print_telemetry(stats: &TelemetryStats) {
    println!(
        "Telemetry: {} sent, {} discarded, {} received, {} connects",
        stats.sent(),
        stats.discarded(),
        stats.inbound(),
        stats.connects()
    );
}
