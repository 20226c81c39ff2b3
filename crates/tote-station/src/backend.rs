//! 外部协作方：托盘 ID 校验与批次上报

use crate::types::{ToteBatch, ToteId};
use serde::Serialize;
use std::io::Write;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// 托盘 ID 校验（例如查询托盘登记表）
pub trait ToteValidator: Send {
    fn validate(&mut self, id: &ToteId, batch: &ToteBatch) -> Result<(), BackendError>;
}

impl<F> ToteValidator for F
where
    F: FnMut(&ToteId, &ToteBatch) -> Result<(), BackendError> + Send,
{
    fn validate(&mut self, id: &ToteId, batch: &ToteBatch) -> Result<(), BackendError> {
        self(id, batch)
    }
}

/// 接受任何通过长度校验的 ID
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl ToteValidator for AcceptAll {
    fn validate(&mut self, _id: &ToteId, _batch: &ToteBatch) -> Result<(), BackendError> {
        Ok(())
    }
}

/// 完成批次的接收方
pub trait BatchSink: Send {
    fn submit(&mut self, batch: &ToteBatch) -> Result<(), BackendError>;
}

impl<T: BatchSink + ?Sized> BatchSink for Box<T> {
    fn submit(&mut self, batch: &ToteBatch) -> Result<(), BackendError> {
        (**self).submit(batch)
    }
}

/// 只打印批次摘要
#[derive(Debug, Clone, Copy, Default)]
pub struct LogBatchSink;

impl BatchSink for LogBatchSink {
    fn submit(&mut self, batch: &ToteBatch) -> Result<(), BackendError> {
        info!(
            "Batch {}: fish {:.2} kg, ice {:.2} kg, water {:.2} kg",
            batch.id.as_ref().map(ToteId::as_str).unwrap_or("-"),
            batch.fish_kg,
            batch.ice_out_kg().unwrap_or(0.0),
            batch.water_out_kg().unwrap_or(0.0)
        );
        Ok(())
    }
}

#[derive(Serialize)]
struct BatchRecord<'a> {
    #[serde(rename = "toteId")]
    tote_id: Option<&'a str>,
    lot_number: Option<&'a str>,
    raw_kg: Option<f64>,
    fish_kg: f64,
    ice_kg: f64,
    water_kg: f64,
}

impl<'a> From<&'a ToteBatch> for BatchRecord<'a> {
    fn from(batch: &'a ToteBatch) -> Self {
        Self {
            tote_id: batch.id.as_ref().map(ToteId::as_str),
            lot_number: batch.lot_number.as_deref(),
            raw_kg: batch.raw_kg,
            fish_kg: batch.fish_kg,
            ice_kg: batch.ice_out_kg().unwrap_or(0.0),
            water_kg: batch.water_out_kg().unwrap_or(0.0),
        }
    }
}

/// 每个批次写一行 JSON（追加到文件或任意 writer）
pub struct JsonLinesBatchSink<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> JsonLinesBatchSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> BatchSink for JsonLinesBatchSink<W> {
    fn submit(&mut self, batch: &ToteBatch) -> Result<(), BackendError> {
        serde_json::to_writer(&mut self.writer, &BatchRecord::from(batch))?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}
