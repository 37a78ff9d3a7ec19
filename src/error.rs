use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tokio::task::JoinError;

/// One of the three concurrently running pipeline stages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Source,
    Executor,
    Sink,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Source => "source",
            Stage::Executor => "executor",
            Stage::Sink => "sink",
        })
    }
}

#[derive(Debug, Error)]
pub enum BenchError {
    #[error("failed to read workload directory {}", path.display())]
    WorkloadDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read workload file {}", path.display())]
    WorkloadFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read recommendation file {}", path.display())]
    RecommendationFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed recommendation at {}:{line}: expected 3 fields, found {found}", path.display())]
    MalformedRecommendation {
        path: PathBuf,
        line: usize,
        found: usize,
    },

    #[error("statement #{counter} (task {ordinal}) failed")]
    Execution {
        counter: u64,
        ordinal: u64,
        #[source]
        source: sqlx::Error,
    },

    #[error("failed to append timing record to {}", path.display())]
    SinkIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{stage} stage hung up before the run completed")]
    StageDisconnected { stage: Stage },

    #[error("{stage} stage stopped after a failure elsewhere in the run")]
    Cancelled { stage: Stage },

    #[error("{stage} stage terminated abnormally")]
    StageAborted {
        stage: Stage,
        #[source]
        source: JoinError,
    },
}

impl BenchError {
    /// The stage that owns this failure.
    pub fn stage(&self) -> Stage {
        match self {
            BenchError::WorkloadDir { .. }
            | BenchError::WorkloadFile { .. }
            | BenchError::RecommendationFile { .. }
            | BenchError::MalformedRecommendation { .. } => Stage::Source,
            BenchError::Execution { .. } => Stage::Executor,
            BenchError::SinkIo { .. } => Stage::Sink,
            BenchError::StageDisconnected { stage }
            | BenchError::Cancelled { stage }
            | BenchError::StageAborted { stage, .. } => *stage,
        }
    }

    /// Hang-ups and cancellations are only ever the echo of another stage's failure.
    pub fn is_secondary(&self) -> bool {
        matches!(
            self,
            BenchError::StageDisconnected { .. } | BenchError::Cancelled { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, BenchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hang_ups_and_cancellations_are_secondary() {
        let hang_up = BenchError::StageDisconnected { stage: Stage::Executor };
        assert!(hang_up.is_secondary());
        assert_eq!(hang_up.stage(), Stage::Executor);
        assert!(BenchError::Cancelled { stage: Stage::Source }.is_secondary());

        let malformed = BenchError::MalformedRecommendation {
            path: PathBuf::from("rec"),
            line: 2,
            found: 1,
        };
        assert!(!malformed.is_secondary());
        assert_eq!(malformed.stage(), Stage::Source);
        assert_eq!(
            malformed.to_string(),
            "malformed recommendation at rec:2: expected 3 fields, found 1"
        );
    }
}
