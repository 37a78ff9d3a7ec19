//! Source -> Executor -> Sink, connected by two bounded queues.
//!
//! Shutdown is two-phase: the source closes the statement queue when it is
//! exhausted, the executor drains it and drops the record queue, and the
//! sink drains that before the run is reported. A failing stage trips the
//! shared shutdown token first, so no further statement is submitted.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::connection::Connection;
use crate::error::{BenchError, Result, Stage};
use crate::executor::Executor;
use crate::sink::ResultSink;
use crate::workload::Workload;

pub const STATEMENT_QUEUE_CAPACITY: usize = 10_000;
pub const RECORD_QUEUE_CAPACITY: usize = 10_000;

#[derive(Clone, Debug)]
pub struct RunReport {
    pub produced: u64,
    pub executed: u64,
    pub written: u64,
    pub output: PathBuf,
    pub elapsed: Duration,
}

pub struct Pipeline<C> {
    conn: Arc<C>,
    output: PathBuf,
    statement_capacity: usize,
    record_capacity: usize,
}

impl<C: Connection + 'static> Pipeline<C> {
    pub fn new(conn: Arc<C>, output: impl Into<PathBuf>) -> Self {
        Self {
            conn,
            output: output.into(),
            statement_capacity: STATEMENT_QUEUE_CAPACITY,
            record_capacity: RECORD_QUEUE_CAPACITY,
        }
    }

    pub fn with_queue_capacity(mut self, statements: usize, records: usize) -> Self {
        self.statement_capacity = statements.max(1);
        self.record_capacity = records.max(1);
        self
    }

    pub async fn run(&self, workload: Workload) -> Result<RunReport> {
        let start = Instant::now();
        info!(?workload, output = %self.output.display(), "starting run");

        let shutdown = CancellationToken::new();
        let (task_tx, task_rx) = mpsc::channel(self.statement_capacity);
        let (record_tx, record_rx) = mpsc::channel(self.record_capacity);

        let executor = Executor::new(self.conn.clone(), shutdown.clone());
        let executor = tokio::spawn(supervise(
            shutdown.clone(),
            record_tx.clone(),
            executor.run(task_rx, record_tx),
        ));
        let sink = tokio::spawn(supervise(
            shutdown.clone(),
            (),
            ResultSink::new(self.output.clone()).run(record_rx),
        ));
        let source = tokio::spawn(supervise(
            shutdown.clone(),
            task_tx.clone(),
            workload.produce(task_tx, shutdown),
        ));

        // The executor only returns once the source has closed its queue or the
        // run was stopped; either way the record queue is closed with it.
        let executed = joined(Stage::Executor, executor.await);
        let written = joined(Stage::Sink, sink.await);
        let produced = joined(Stage::Source, source.await);

        let (produced, executed, written) = root_cause(produced, executed, written)?;
        let report = RunReport {
            produced,
            executed,
            written,
            output: self.output.clone(),
            elapsed: start.elapsed(),
        };
        info!(
            produced,
            executed,
            written,
            elapsed = ?report.elapsed,
            "run complete"
        );
        Ok(report)
    }
}

/// Runs one stage. A failure trips `shutdown` before `outbound` (a clone of
/// the stage's output queue) is released, so the next stage never mistakes a
/// failed upstream for an exhausted one.
async fn supervise<G, F>(shutdown: CancellationToken, outbound: G, stage: F) -> Result<u64>
where
    F: Future<Output = Result<u64>>,
{
    let outcome = stage.await;
    if let Err(e) = &outcome {
        if !e.is_secondary() {
            error!(stage = %e.stage(), "{}", e);
        }
        shutdown.cancel();
    }
    drop(outbound);
    outcome
}

fn joined(stage: Stage, outcome: std::result::Result<Result<u64>, JoinError>) -> Result<u64> {
    outcome.map_err(|source| BenchError::StageAborted { stage, source })?
}

/// Picks the failure that caused the others: hang-ups are echoes of a
/// failure elsewhere, so they only surface when nothing else went wrong.
fn root_cause(
    produced: Result<u64>,
    executed: Result<u64>,
    written: Result<u64>,
) -> Result<(u64, u64, u64)> {
    let mut fallback = None;
    let mut counts = [0u64; 3];
    for (slot, outcome) in counts.iter_mut().zip([produced, executed, written]) {
        match outcome {
            Ok(n) => *slot = n,
            Err(e) if e.is_secondary() => {
                warn!(stage = %e.stage(), "{}", e);
                fallback.get_or_insert(e);
            }
            Err(e) => return Err(e),
        }
    }
    match fallback {
        Some(e) => Err(e),
        None => Ok((counts[0], counts[1], counts[2])),
    }
}
