use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use super::classify::DrumLabel;

const HEADER: &str = "timestamp,chunk,start,end,kick,snare,hihat,noise,label";

/// One classified chunk as recorded in the audit trail.
#[derive(Clone, Debug, PartialEq)]
pub struct AuditRow {
    pub chunk: usize,
    pub start: f64,
    pub end: f64,
    pub scores: [f64; 4],
    pub label: DrumLabel,
}

/// Append-only record of classification decisions. Never consulted by the engine.
pub trait AuditSink {
    /// Append the rows of one request; they share a single timestamp.
    fn append(&mut self, rows: &[AuditRow]) -> Result<()>;
}

/// Discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullAudit;

impl AuditSink for NullAudit {
    fn append(&mut self, _rows: &[AuditRow]) -> Result<()> {
        Ok(())
    }
}

/// Keeps rows in memory. Clones share the same buffer.
#[derive(Clone, Debug, Default)]
pub struct MemoryAudit {
    rows: Arc<Mutex<Vec<AuditRow>>>,
}

impl MemoryAudit {
    pub fn rows(&self) -> Vec<AuditRow> {
        self.rows.lock().map(|rows| rows.clone()).unwrap_or_default()
    }
}

impl AuditSink for MemoryAudit {
    fn append(&mut self, rows: &[AuditRow]) -> Result<()> {
        self.rows
            .lock()
            .map_err(|_| anyhow::anyhow!("audit buffer poisoned"))?
            .extend_from_slice(rows);
        Ok(())
    }
}

/// CSV file with a header row written when the file is first created.
#[derive(Clone, Debug)]
pub struct CsvAuditLog {
    path: PathBuf,
}

impl CsvAuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl AuditSink for CsvAuditLog {
    fn append(&mut self, rows: &[AuditRow]) -> Result<()> {
        let is_new = !self.path.is_file();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open audit log: {}", self.path.display()))?;
        let mut writer = BufWriter::new(file);

        if is_new {
            writeln!(writer, "{}", HEADER)?;
        }

        let timestamp = chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string();
        for row in rows {
            writeln!(
                writer,
                "{},chunk_{},{},{},{},{},{},{},{}",
                timestamp,
                row.chunk,
                row.start,
                row.end,
                row.scores[0],
                row.scores[1],
                row.scores[2],
                row.scores[3],
                row.label.as_str()
            )?;
        }

        writer
            .flush()
            .with_context(|| format!("Failed to write audit log: {}", self.path.display()))?;
        log::debug!("Appended {} rows to {}", rows.len(), self.path.display());
        Ok(())
    }
}
