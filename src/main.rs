use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;

mod config;
mod db;
mod error;
mod model;
mod normalize;
mod pipeline;
mod schema;
mod seed;
mod tabular;
mod upsert;

use config::Config;
use db::init_db;
use pipeline::FileType;
use tabular::Table;
use tracing::{error, info, warn};
use tracing_appender::rolling;

/// Batch loader for HR tabular exports. Each flag names one input file;
/// omitted types are simply not loaded.
#[derive(Parser, Debug)]
#[command(name = "hrm-loader", about = "Load HR CSV exports into the relational schema")]
struct Args {
    #[arg(long)]
    employee_master: Option<PathBuf>,
    #[arg(long)]
    employee_exit: Option<PathBuf>,
    #[arg(long)]
    experience_report: Option<PathBuf>,
    #[arg(long)]
    work_profile: Option<PathBuf>,
    #[arg(long)]
    attendance_report: Option<PathBuf>,
    #[arg(long)]
    timesheet_report: Option<PathBuf>,
    #[arg(long)]
    project_allocations: Option<PathBuf>,
    #[arg(long)]
    resource_utilization: Option<PathBuf>,

    /// Create any missing tables and exit without loading data.
    #[arg(long)]
    bootstrap_only: bool,
}

impl Args {
    fn inputs(&self) -> Vec<(FileType, &PathBuf)> {
        [
            (FileType::EmployeeMaster, &self.employee_master),
            (FileType::EmployeeExit, &self.employee_exit),
            (FileType::ExperienceReport, &self.experience_report),
            (FileType::WorkProfile, &self.work_profile),
            (FileType::AttendanceReport, &self.attendance_report),
            (FileType::TimesheetReport, &self.timesheet_report),
            (FileType::ProjectAllocations, &self.project_allocations),
            (FileType::ResourceUtilization, &self.resource_utilization),
        ]
        .into_iter()
        .filter_map(|(t, p)| p.as_ref().map(|p| (t, p)))
        .collect()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenv().ok();

    let args = Args::parse();
    let config = Config::from_env();

    // Rolling daily log
    let file_appender = rolling::daily(&config.log_dir, "loader.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_target(false)
        .with_level(true)
        .init();

    info!("Loader starting...");

    let pool = init_db(&config.database_url, config.db_max_connections)
        .await
        .context("failed to connect to database")?;

    schema::bootstrap(&pool)
        .await
        .context("schema bootstrap failed")?;
    if args.bootstrap_only {
        println!("Schema ready.");
        pool.close().await;
        return Ok(ExitCode::SUCCESS);
    }

    // Read every input wholesale before touching the database; a file that
    // cannot be read fails the run but the others still load.
    let mut tables: BTreeMap<FileType, Table> = BTreeMap::new();
    let mut read_failures = Vec::new();
    for (file_type, path) in args.inputs() {
        match Table::from_path(path) {
            Ok(table) => {
                tables.insert(file_type, table);
            }
            Err(e) => {
                warn!(file_type = %file_type, error = %e, "skipping unreadable input");
                read_failures.push(format!("{}: {}", file_type, e));
            }
        }
    }
    if tables.is_empty() && read_failures.is_empty() {
        println!("No input files given; nothing to do.");
        pool.close().await;
        return Ok(ExitCode::SUCCESS);
    }

    let outcome = match pipeline::run(&pool, tables).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(error = %e, "pipeline aborted");
            pool.close().await;
            return Err(e.into());
        }
    };
    pool.close().await;

    let success = outcome.success && read_failures.is_empty();
    println!("{}", outcome.message);
    if !read_failures.is_empty() {
        println!("Unreadable inputs: {}", read_failures.join("; "));
    }
    println!("{}", serde_json::to_string_pretty(&outcome.stats)?);

    Ok(if success { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
