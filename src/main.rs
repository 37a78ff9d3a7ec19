use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use chrono::Local;
use clap::Parser;
use sqlx::{MySql, Pool};
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use workload_bench::connection::{DEFAULT_DB_HOST, DEFAULT_DB_NAME, DEFAULT_DB_PORT, DEFAULT_DB_USER};
use workload_bench::{DbConfig, Pipeline, RunReport, Workload};

const ORIGIN_LOG: &str = "EXEC_ORIGIN";
const BUILD_INDEX_LOG: &str = "EXEC_BUILDINDEX";
const WITH_INDEX_LOG: &str = "EXEC_ADDIDX";

#[derive(Parser, Debug)]
#[command(author, version, about = "Replay a numbered SQL workload against TiDB and log per-statement latency")]
struct Args {
    /// Database host
    #[arg(long, default_value = DEFAULT_DB_HOST)]
    db_host: String,

    /// Database port
    #[arg(long, default_value_t = DEFAULT_DB_PORT)]
    db_port: u16,

    /// Database name
    #[arg(long, default_value = DEFAULT_DB_NAME)]
    db_name: String,

    /// Database user
    #[arg(short, long, default_value = DEFAULT_DB_USER)]
    user: String,

    /// Database password
    #[arg(short, long, default_value = "")]
    password: String,

    /// Directory holding 1.sql, 2.sql, ...
    #[arg(long, default_value = "/tmp/queries/")]
    query_dir: PathBuf,

    /// Index recommendation file used by --build-index
    #[arg(long, default_value = "/tmp/indexadvisor/1_RESULT")]
    idx_file: PathBuf,

    /// Directory the timing logs are appended to
    #[arg(long, default_value = "/tmp/indexadvisor")]
    output_dir: PathBuf,

    /// Number of recommended indexes to create
    #[arg(long, default_value_t = 3)]
    top_n: usize,

    /// Create the recommended virtual indexes between the two passes
    #[arg(long, default_value_t = false)]
    build_index: bool,

    /// Enable verbose logging (print individual SQLs)
    #[arg(long, default_value_t = false)]
    verbose: bool,
}

impl Args {
    fn db_config(&self) -> DbConfig {
        DbConfig {
            host: self.db_host.clone(),
            port: self.db_port,
            user: self.user.clone(),
            password: self.password.clone(),
            database: self.db_name.clone(),
        }
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    if let Err(e) = run(args).await {
        error!("benchmark aborted: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let db = args.db_config();

    println!("--- TiDB workload benchmark ---");
    println!("endpoint       : {}", db.endpoint());
    println!("query_dir      : {}", args.query_dir.display());
    println!("output_dir     : {}", args.output_dir.display());
    println!("build_index    : {}", args.build_index);
    if args.build_index {
        println!("idx_file       : {}", args.idx_file.display());
        println!("top_n          : {}", args.top_n);
    }
    println!("started at     : {}", Local::now().format("%Y-%m-%d %H:%M:%S"));

    tokio::fs::create_dir_all(&args.output_dir)
        .await
        .with_context(|| format!("failed to create output directory {}", args.output_dir.display()))?;

    let pool = db
        .connect()
        .await
        .with_context(|| format!("failed to connect to {}", db.endpoint()))?;
    let conn = Arc::new(pool);
    let start_time = Instant::now();

    let mut reports = Vec::with_capacity(3);
    reports.push(
        run_phase(&conn, &args.output_dir, ORIGIN_LOG, Workload::Directory(args.query_dir.clone()))
            .await?,
    );

    if args.build_index {
        let workload = Workload::Recommendations {
            path: args.idx_file.clone(),
            top_n: args.top_n,
        };
        reports.push(run_phase(&conn, &args.output_dir, BUILD_INDEX_LOG, workload).await?);
    }

    reports.push(
        run_phase(&conn, &args.output_dir, WITH_INDEX_LOG, Workload::Directory(args.query_dir.clone()))
            .await?,
    );

    println!();
    println!("=== Summary ===");
    println!("Elapsed        : {:.2?}", start_time.elapsed());
    for report in &reports {
        println!(
            "{:<16} statements={} elapsed={:.2?} -> {}",
            report.output.file_name().and_then(|n| n.to_str()).unwrap_or_default(),
            report.written,
            report.elapsed,
            report.output.display()
        );
    }

    conn.close().await;
    Ok(())
}

async fn run_phase(
    conn: &Arc<Pool<MySql>>,
    output_dir: &Path,
    name: &str,
    workload: Workload,
) -> anyhow::Result<RunReport> {
    info!(phase = name, "phase started");
    let report = Pipeline::new(conn.clone(), output_dir.join(name))
        .run(workload)
        .await
        .with_context(|| format!("{} phase failed", name))?;
    info!(phase = name, statements = report.written, "phase done");
    Ok(report)
}
