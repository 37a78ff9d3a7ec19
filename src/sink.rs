//! Append-only timing log.
//!
//! Every record is written with its own open/append/close cycle, so the log
//! on disk reflects everything measured up to the moment a run dies.

use std::path::PathBuf;
use std::str::FromStr;

use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{BenchError, Result};

/// Latency of one executed statement, keyed by the executor's run counter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimingRecord {
    pub counter: u64,
    pub elapsed_secs: f64,
}

impl TimingRecord {
    /// `counter` left-justified to ten columns, then seconds, then newline.
    pub fn render(&self) -> String {
        format!("{:<10}{:.6}\n", self.counter, self.elapsed_secs)
    }
}

/// Error for a line that is not a rendered [`TimingRecord`].
///
/// The counter column has no separator, so a counter of eleven or more
/// digits (past 9,999,999,999 statements in one log) runs into the seconds
/// and cannot be told apart from a ten-digit one.
#[derive(Debug, PartialEq, Eq)]
pub struct ParseRecordError(pub String);

impl FromStr for TimingRecord {
    type Err = ParseRecordError;

    fn from_str(line: &str) -> std::result::Result<Self, Self::Err> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.len() < 10 || !line.is_char_boundary(10) {
            return Err(ParseRecordError(line.to_string()));
        }
        let (counter, secs) = line.split_at(10);
        let counter = counter
            .trim_end()
            .parse()
            .map_err(|_| ParseRecordError(line.to_string()))?;
        let elapsed_secs = secs
            .parse()
            .map_err(|_| ParseRecordError(line.to_string()))?;
        Ok(TimingRecord { counter, elapsed_secs })
    }
}

pub struct ResultSink {
    path: PathBuf,
}

impl ResultSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn append(&self, record: &TimingRecord) -> Result<()> {
        self.append_line(&record.render())
            .await
            .map_err(|source| BenchError::SinkIo {
                path: self.path.clone(),
                source,
            })
    }

    async fn append_line(&self, line: &str) -> std::io::Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }

    /// Appends records in arrival order until the executor closes the queue.
    pub async fn run(self, mut records: mpsc::Receiver<TimingRecord>) -> Result<u64> {
        let mut written = 0;
        while let Some(record) = records.recv().await {
            self.append(&record).await?;
            written += 1;
        }
        debug!(written, path = %self.path.display(), "timing log drained");
        Ok(written)
    }
}
