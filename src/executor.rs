use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::connection::Connection;
use crate::error::{BenchError, Result, Stage};
use crate::sink::TimingRecord;
use crate::workload::StatementTask;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatementKind {
    Query,
    Mutation,
}

impl StatementKind {
    /// Anything starting with `select` (any case) goes through the read path.
    pub fn classify(sql: &str) -> Self {
        let head = sql.trim_start().as_bytes();
        if head.len() >= 6 && head[..6].eq_ignore_ascii_case(b"select") {
            StatementKind::Query
        } else {
            StatementKind::Mutation
        }
    }
}

/// Runs statements one at a time, in arrival order, and times each one.
///
/// Once `shutdown` fires no further statement is submitted, and one still in
/// flight is dropped without producing a record.
pub struct Executor<C> {
    conn: Arc<C>,
    counter: u64,
    shutdown: CancellationToken,
}

impl<C: Connection> Executor<C> {
    pub fn new(conn: Arc<C>, shutdown: CancellationToken) -> Self {
        Self {
            conn,
            counter: 0,
            shutdown,
        }
    }

    /// Executes one task. The counter advances on receipt, so a failed
    /// statement still consumes its number.
    pub async fn execute(&mut self, task: &StatementTask) -> Result<TimingRecord> {
        self.counter += 1;
        let counter = self.counter;
        let kind = StatementKind::classify(&task.sql);
        debug!(counter, ordinal = task.ordinal, sql = %task.sql, "submitting statement");

        let conn = &self.conn;
        let call = async {
            match kind {
                StatementKind::Query => conn.query(&task.sql).await,
                StatementKind::Mutation => conn.execute(&task.sql).await,
            }
        };

        let start = Instant::now();
        let outcome = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => {
                return Err(BenchError::Cancelled { stage: Stage::Executor });
            }
            outcome = call => outcome,
        };
        let elapsed = start.elapsed();

        let rows = outcome.map_err(|source| BenchError::Execution {
            counter,
            ordinal: task.ordinal,
            source,
        })?;

        let record = TimingRecord {
            counter,
            elapsed_secs: elapsed.as_secs_f64(),
        };
        info!(
            counter,
            ordinal = task.ordinal,
            kind = ?kind,
            rows,
            secs = record.elapsed_secs,
            "statement done"
        );
        Ok(record)
    }

    /// Drains `tasks` until the source closes it or `shutdown` fires,
    /// forwarding a record per statement. Stops at the first failing statement.
    pub async fn run(
        mut self,
        mut tasks: mpsc::Receiver<StatementTask>,
        records: mpsc::Sender<TimingRecord>,
    ) -> Result<u64> {
        loop {
            let task = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    return Err(BenchError::Cancelled { stage: Stage::Executor });
                }
                task = tasks.recv() => task,
            };
            let Some(task) = task else { break };
            let record = self.execute(&task).await?;
            records
                .send(record)
                .await
                .map_err(|_| BenchError::StageDisconnected { stage: Stage::Sink })?;
        }
        Ok(self.counter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use test_case::test_case;

    #[test_case("select 1", StatementKind::Query; "lowercase")]
    #[test_case("SELECT * FROM t", StatementKind::Query; "uppercase")]
    #[test_case("\n  SeLeCt count(*) from lineitem", StatementKind::Query; "leading whitespace")]
    #[test_case("insert into t values (1)", StatementKind::Mutation; "insert")]
    #[test_case("create index virtual_index_1 on orders(o_orderkey);", StatementKind::Mutation; "ddl")]
    #[test_case("with x as (select 1) select * from x", StatementKind::Mutation; "cte")]
    #[test_case("sel", StatementKind::Mutation; "short")]
    fn classify(sql: &str, expected: StatementKind) {
        assert_eq!(StatementKind::classify(sql), expected);
    }

    #[derive(Default)]
    struct Calls {
        log: Mutex<Vec<(StatementKind, String)>>,
    }

    #[async_trait]
    impl Connection for Calls {
        async fn query(&self, sql: &str) -> std::result::Result<u64, sqlx::Error> {
            self.log.lock().unwrap().push((StatementKind::Query, sql.to_string()));
            Ok(1)
        }

        async fn execute(&self, sql: &str) -> std::result::Result<u64, sqlx::Error> {
            if sql.starts_with("boom") {
                return Err(sqlx::Error::Protocol("rejected".into()));
            }
            self.log.lock().unwrap().push((StatementKind::Mutation, sql.to_string()));
            Ok(0)
        }
    }

    fn task(ordinal: u64, sql: &str) -> StatementTask {
        StatementTask { ordinal, sql: sql.to_string() }
    }

    #[tokio::test]
    async fn routes_by_kind_and_counts_independently_of_ordinal() {
        let conn = Arc::new(Calls::default());
        let mut executor = Executor::new(conn.clone(), CancellationToken::new());

        let first = executor.execute(&task(4, "select 1")).await.unwrap();
        let second = executor.execute(&task(9, "update t set a = 1")).await.unwrap();

        assert_eq!(first.counter, 1);
        assert_eq!(second.counter, 2);
        assert!(first.elapsed_secs >= 0.0);
        let log = conn.log.lock().unwrap();
        assert_eq!(log[0].0, StatementKind::Query);
        assert_eq!(log[1].0, StatementKind::Mutation);
    }

    #[tokio::test]
    async fn failure_stops_the_run_without_a_record() {
        let conn = Arc::new(Calls::default());
        let (task_tx, task_rx) = mpsc::channel(8);
        let (record_tx, mut record_rx) = mpsc::channel(8);
        for (i, sql) in ["select 1", "boom", "select 3"].into_iter().enumerate() {
            task_tx.send(task(i as u64 + 1, sql)).await.unwrap();
        }
        drop(task_tx);

        let err = Executor::new(conn.clone(), CancellationToken::new())
            .run(task_rx, record_tx)
            .await
            .unwrap_err();
        assert!(matches!(err, BenchError::Execution { counter: 2, ordinal: 2, .. }));

        assert_eq!(record_rx.recv().await.map(|r| r.counter), Some(1));
        assert!(record_rx.recv().await.is_none());
        assert_eq!(conn.log.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn shutdown_prevents_further_statements() {
        let conn = Arc::new(Calls::default());
        let shutdown = CancellationToken::new();
        let (task_tx, task_rx) = mpsc::channel(8);
        let (record_tx, mut record_rx) = mpsc::channel(8);
        task_tx.send(task(1, "create index virtual_index_1 on t(a);")).await.unwrap();
        shutdown.cancel();

        let err = Executor::new(conn.clone(), shutdown)
            .run(task_rx, record_tx)
            .await
            .unwrap_err();
        assert!(matches!(err, BenchError::Cancelled { stage: Stage::Executor }));
        assert!(record_rx.recv().await.is_none());
        assert!(conn.log.lock().unwrap().is_empty());
    }
}
