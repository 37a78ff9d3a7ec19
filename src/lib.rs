//! Replays a numbered SQL workload against TiDB one statement at a time and
//! appends each statement's wall-clock latency to a timing log.

pub mod connection;
pub mod error;
pub mod executor;
pub mod pipeline;
pub mod sink;
pub mod workload;

pub use connection::{Connection, DbConfig};
pub use error::{BenchError, Result, Stage};
pub use executor::{Executor, StatementKind};
pub use pipeline::{Pipeline, RunReport};
pub use sink::{ResultSink, TimingRecord};
pub use workload::{StatementTask, Workload};
