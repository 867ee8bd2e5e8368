use std::{fs::File, path::Path};

use anyhow::Context;
use serde::Serialize;
use shared::{Event, Record};

/// One CSV line per event. Columns that do not apply to an event stay empty.
#[derive(Debug, Serialize, PartialEq)]
pub struct TraceRow {
    pub at_ms: f64,
    pub kind: &'static str,
    pub unit: Option<u32>,
    pub worker: Option<u32>,
    pub depth: Option<usize>,
    pub reason: Option<String>,
}

impl From<&Record> for TraceRow {
    fn from(record: &Record) -> Self {
        let (depth, reason) = match record.event {
            Event::ArrivalEntered { depth, .. } | Event::UnitDequeued { depth, .. } => {
                (Some(depth), None)
            }
            Event::ArrivalAbandoned { reason, .. } => (None, Some(reason.to_string())),
            _ => (None, None),
        };
        Self {
            at_ms: record.at.as_micros() as f64 / 1000.0,
            kind: record.event.kind(),
            unit: record.event.unit(),
            worker: record.event.worker(),
            depth,
            reason,
        }
    }
}

pub struct TraceWriter {
    writer: csv::Writer<File>,
}

impl TraceWriter {
    pub fn create(path: &Path) -> anyhow::Result<Self> {
        let writer = csv::Writer::from_path(path)
            .with_context(|| format!("Creating trace file {}", path.display()))?;
        Ok(Self { writer })
    }

    pub fn write(&mut self, record: &Record) -> anyhow::Result<()> {
        self.writer.serialize(TraceRow::from(record))?;
        Ok(())
    }

    pub fn finish(mut self) -> anyhow::Result<()> {
        self.writer.flush().context("Flushing trace file")
    }
}
