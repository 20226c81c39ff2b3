//! 操作员控制台
//!
//! 专用输入线程持有 rustyline `Editor`（保留历史记录），
//! 把输入行通过通道交给主线程解析和分发，主线程同时等待 Ctrl+C 和控制循环结束。
//!
//! 数字 1–4 对应硬件按钮：1 开始 / 2 停止 / 3 手动加冰 / 4 手动加水。

use anyhow::Result;
use crossbeam_channel::{Receiver, bounded};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::thread;
use thiserror::Error;
use tote_sensor::{SharedSensor, WeightSample, WeightSensorClient};
use tote_station::{InputLine, StationError, StationHandle, Valve};

use crate::utils::format_status;

const HISTORY_FILE: &str = ".tote_history";

/// 控制台命令
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Start,
    Stop,
    Manual(Valve),
    SubmitId(String),
    Lot(String),
    RawKg(f64),
    Reset,
    Status,
    Weigh,
    Help,
    Quit,
}

#[derive(Error, Debug, PartialEq)]
pub enum ConsoleError {
    #[error("unknown command '{0}' (type 'help')")]
    Unknown(String),
    #[error("'{0}' needs an argument")]
    MissingArgument(&'static str),
    #[error("invalid weight '{0}'")]
    InvalidWeight(String),
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Result<Self, ConsoleError> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };
        let argument = |name: &'static str| {
            if rest.is_empty() {
                Err(ConsoleError::MissingArgument(name))
            } else {
                Ok(rest.to_string())
            }
        };

        match word.to_ascii_lowercase().as_str() {
            "start" => Ok(ConsoleCommand::Start),
            "stop" => Ok(ConsoleCommand::Stop),
            "ice" => Ok(ConsoleCommand::Manual(Valve::Ice)),
            "water" => Ok(ConsoleCommand::Manual(Valve::Water)),
            "id" => Ok(ConsoleCommand::SubmitId(argument("id")?)),
            "lot" => Ok(ConsoleCommand::Lot(argument("lot")?)),
            "raw" => {
                let value = argument("raw")?;
                value
                    .parse::<f64>()
                    .map(ConsoleCommand::RawKg)
                    .map_err(|_| ConsoleError::InvalidWeight(value))
            },
            "reset" => Ok(ConsoleCommand::Reset),
            "status" => Ok(ConsoleCommand::Status),
            "weigh" | "w" => Ok(ConsoleCommand::Weigh),
            "help" | "?" => Ok(ConsoleCommand::Help),
            "quit" | "exit" => Ok(ConsoleCommand::Quit),
            other => match other.parse::<u8>().ok().and_then(InputLine::from_button_code) {
                Some(button) => Ok(ConsoleCommand::from(button)),
                None => Err(ConsoleError::Unknown(other.to_string())),
            },
        }
    }
}

impl From<InputLine> for ConsoleCommand {
    fn from(button: InputLine) -> Self {
        match button {
            InputLine::Start => ConsoleCommand::Start,
            InputLine::Stop => ConsoleCommand::Stop,
            InputLine::ManualIce => ConsoleCommand::Manual(Valve::Ice),
            InputLine::ManualWater => ConsoleCommand::Manual(Valve::Water),
        }
    }
}

/// 分发结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// 执行一条控制台命令
///
/// `scale` 与控制循环共用同一个传感器实例，读取在同一把锁下与 tick 串行。
pub fn dispatch(
    command: ConsoleCommand,
    station: &StationHandle,
    scale: &SharedSensor,
) -> Result<Flow, StationError> {
    match command {
        ConsoleCommand::Start => station.start()?,
        ConsoleCommand::Stop => station.stop()?,
        ConsoleCommand::Manual(valve) => station.manual(valve)?,
        ConsoleCommand::SubmitId(id) => {
            station.submit_id(id.as_str())?;
            println!("✅ tote {} accepted", id.trim());
        },
        ConsoleCommand::Lot(lot) => station.set_lot_number(lot)?,
        ConsoleCommand::RawKg(kg) => station.set_raw_kg(kg)?,
        ConsoleCommand::Reset => station.reset()?,
        ConsoleCommand::Status => println!("{}", format_status(&station.status())),
        ConsoleCommand::Weigh => println!("{}", weigh_line(scale)),
        ConsoleCommand::Help => print_help(),
        ConsoleCommand::Quit => {
            station.shutdown()?;
            return Ok(Flow::Quit);
        },
    }
    Ok(Flow::Continue)
}

/// 输入线程发给主线程的内容
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleInput {
    Line(String),
    /// 控制台中的 Ctrl+C（当作停止按钮）
    Interrupt,
    /// Ctrl+D 或终端关闭
    Closed,
}

/// 启动专用输入线程
pub fn spawn_input() -> Result<Receiver<ConsoleInput>> {
    let (tx, rx) = bounded::<ConsoleInput>(16);
    thread::Builder::new()
        .name("tote-console".to_string())
        .spawn(move || {
            let mut rl = match DefaultEditor::new() {
                Ok(rl) => rl,
                Err(e) => {
                    eprintln!("Failed to initialize readline: {}", e);
                    let _ = tx.send(ConsoleInput::Closed);
                    return;
                },
            };
            // 首次运行没有历史文件
            rl.load_history(HISTORY_FILE).ok();

            println!("Tote station console v{}", env!("CARGO_PKG_VERSION"));
            println!("Type 'help' for commands, 'quit' to exit");

            loop {
                match rl.readline("tote> ") {
                    Ok(line) => {
                        let line = line.trim().to_string();
                        if line.is_empty() {
                            continue;
                        }
                        let _ = rl.add_history_entry(line.as_str());
                        let quit = matches!(line.as_str(), "quit" | "exit");
                        if tx.send(ConsoleInput::Line(line)).is_err() || quit {
                            break;
                        }
                    },
                    Err(ReadlineError::Interrupted) => {
                        println!("^C");
                        if tx.send(ConsoleInput::Interrupt).is_err() {
                            break;
                        }
                    },
                    Err(ReadlineError::Eof) => {
                        let _ = tx.send(ConsoleInput::Closed);
                        break;
                    },
                    Err(e) => {
                        eprintln!("Console error: {:?}", e);
                        let _ = tx.send(ConsoleInput::Closed);
                        break;
                    },
                }
            }
            rl.save_history(HISTORY_FILE).ok();
        })?;
    Ok(rx)
}

/// 处理一条输入；返回 `Flow::Quit` 表示已请求退出
pub fn handle_input(input: ConsoleInput, station: &StationHandle, scale: &SharedSensor) -> Flow {
    let line = match input {
        ConsoleInput::Line(line) => line,
        ConsoleInput::Interrupt => {
            eprintln!("🛑 stop");
            if let Err(e) = station.stop() {
                eprintln!("❌ {}", e);
            }
            return Flow::Continue;
        },
        ConsoleInput::Closed => {
            let _ = station.shutdown();
            return Flow::Quit;
        },
    };

    let command = match ConsoleCommand::parse(&line) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("❌ {}", e);
            return Flow::Continue;
        },
    };
    match dispatch(command, station, scale) {
        Ok(flow) => flow,
        Err(StationError::ChannelClosed) => Flow::Quit,
        Err(e) => {
            eprintln!("❌ {}", e);
            Flow::Continue
        },
    }
}

/// 直接读一次秤
fn weigh_line(scale: &SharedSensor) -> String {
    match scale.with(|s| s.read_gross_weight_kg()) {
        WeightSample::Kg(kg) => format!("scale ({}): {:.2} kg", scale.variant(), kg),
        WeightSample::Failed(failure) => {
            format!("scale ({}): read failed: {}", scale.variant(), failure)
        },
    }
}

fn print_help() {
    println!("Commands:");
    println!("  start | 1          start filling (weight must be above minimum)");
    println!("  stop  | 2          cancel the current tote");
    println!("  ice   | 3          manual ice override (5 s)");
    println!("  water | 4          manual water override (5 s)");
    println!("  id <tote id>       submit the tote ID while waiting");
    println!("  lot <lot number>   lot number for the next tote");
    println!("  raw <kg>           upstream raw weight for the next tote");
    println!("  reset              leave ERROR after the fault is cleared");
    println!("  status             show station status");
    println!("  weigh | w          read the scale now");
    println!("  quit               close valves and exit");
}
