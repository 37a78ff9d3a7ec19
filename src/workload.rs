//! Workload sources: turn an on-disk location into an ordered stream of
//! statements on the executor's queue.

use std::io;
use std::path::{Path, PathBuf};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{BenchError, Result, Stage};

/// One statement of the workload and its 1-based position in the source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatementTask {
    pub ordinal: u64,
    pub sql: String,
}

#[derive(Clone, Debug)]
pub enum Workload {
    /// `1.sql`, `2.sql`, ... up to the number of directory entries.
    Directory(PathBuf),
    /// `create index` statements for the first `top_n` recommendation rows.
    Recommendations { path: PathBuf, top_n: usize },
}

impl Workload {
    /// Reads the whole workload up front, so a load failure surfaces before
    /// any statement reaches the executor.
    pub async fn load(&self) -> Result<Vec<StatementTask>> {
        match self {
            Workload::Directory(dir) => load_directory(dir).await,
            Workload::Recommendations { path, top_n } => {
                let statements = build_index_statements(path, *top_n).await?;
                Ok(statements
                    .into_iter()
                    .enumerate()
                    .map(|(i, sql)| StatementTask { ordinal: i as u64 + 1, sql })
                    .collect())
            }
        }
    }

    /// Feeds every statement to `tx` and closes it by dropping. Returns the
    /// number of statements produced.
    pub async fn produce(
        self,
        tx: mpsc::Sender<StatementTask>,
        shutdown: CancellationToken,
    ) -> Result<u64> {
        let tasks = self.load().await?;
        let mut produced = 0;
        for task in tasks {
            if shutdown.is_cancelled() {
                return Err(BenchError::Cancelled { stage: Stage::Source });
            }
            tx.send(task)
                .await
                .map_err(|_| BenchError::StageDisconnected { stage: Stage::Executor })?;
            produced += 1;
        }
        info!(produced, "workload exhausted");
        Ok(produced)
    }
}

async fn count_entries(dir: &Path) -> io::Result<u64> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut n = 0;
    while entries.next_entry().await?.is_some() {
        n += 1;
    }
    Ok(n)
}

async fn load_directory(dir: &Path) -> Result<Vec<StatementTask>> {
    let n = count_entries(dir).await.map_err(|source| BenchError::WorkloadDir {
        path: dir.to_path_buf(),
        source,
    })?;
    debug!(dir = %dir.display(), entries = n, "scanning workload directory");

    let mut tasks = Vec::new();
    for i in 1..=n {
        let path = dir.join(format!("{}.sql", i));
        match tokio::fs::read_to_string(&path).await {
            Ok(sql) => tasks.push(StatementTask { ordinal: i, sql }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(index = i, "no workload file, skipping");
            }
            Err(source) => return Err(BenchError::WorkloadFile { path, source }),
        }
    }
    Ok(tasks)
}

/// Reads the recommendation file and renders its first `top_n` rows as DDL.
///
/// Every row that would be used is validated before anything is returned,
/// so a malformed file never yields a partial workload.
pub async fn build_index_statements(path: &Path, top_n: usize) -> Result<Vec<String>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| BenchError::RecommendationFile {
            path: path.to_path_buf(),
            source,
        })?;

    content
        .lines()
        .take(top_n)
        .enumerate()
        .map(|(i, line)| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            match fields.as_slice() {
                [table, index, _] => Ok(index_statement(i + 1, table, index)),
                _ => Err(BenchError::MalformedRecommendation {
                    path: path.to_path_buf(),
                    line: i + 1,
                    found: fields.len(),
                }),
            }
        })
        .collect()
}

fn index_statement(position: usize, table: &str, index: &str) -> String {
    let table = table.strip_suffix(':').unwrap_or(table);
    format!("create index virtual_index_{} on {}{};", position, table, index)
}
