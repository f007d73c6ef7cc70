use std::collections::HashSet;

use chrono::Local;
use chrono::NaiveDate;
use sqlx::MySqlPool;
use tracing::info;

use crate::error::LoaderError;
use crate::model::status::Status;
use crate::seed::StageStat;
use crate::tabular::Table;
use crate::upsert::{SqlValue, upsert};

const STAGE: &str = "project";

pub const PROJECT_COLUMNS: &[&str] = &[
    "project_id",
    "project_name",
    "client_name",
    "status",
    "start_date",
    "end_date",
];

/// Placeholder rows for project codes seen in timesheet data but absent
/// from the project table. Timesheets only carry the code, so name and
/// client are synthesized for later correction by the reporting side.
pub fn placeholder_rows(
    timesheet: &Table,
    existing: &HashSet<String>,
    start_date: NaiveDate,
) -> Vec<Vec<SqlValue>> {
    let mut seen = HashSet::new();
    let mut rows = Vec::new();

    for row in timesheet.rows() {
        let Some(project_id) = row.get("project_id") else { continue };
        if existing.contains(project_id) || !seen.insert(project_id.to_string()) {
            continue;
        }
        rows.push(vec![
            SqlValue::String(project_id.to_string()),
            SqlValue::String(format!("Project {}", project_id)),
            SqlValue::String("Default Client".to_string()),
            SqlValue::String(Status::Active.to_string()),
            SqlValue::Date(start_date),
            SqlValue::Null,
        ]);
    }
    rows
}

/// Make sure every project referenced by the timesheet exists before
/// allocations and timesheets point at it.
pub async fn seed(pool: &MySqlPool, timesheet: &Table) -> Result<StageStat, LoaderError> {
    let existing: HashSet<String> =
        sqlx::query_scalar("SELECT project_id FROM project WHERE status = 'Active'")
            .fetch_all(pool)
            .await
            .map_err(|e| LoaderError::from_stage(STAGE, e))?
            .into_iter()
            .collect();

    let rows = placeholder_rows(timesheet, &existing, Local::now().date_naive());
    let mut stat = StageStat {
        rows_in: rows.len(),
        ..StageStat::default()
    };
    if rows.is_empty() {
        info!("no new projects referenced by timesheet data");
        return Ok(stat);
    }

    let outcome = upsert(pool, "project", PROJECT_COLUMNS, &rows, None)
        .await
        .map_err(|e| LoaderError::from_stage(STAGE, e))?;
    stat.absorb(&outcome);
    Ok(stat)
}
