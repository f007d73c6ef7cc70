use sqlx::MySqlPool;
use tracing::warn;

use crate::error::LoaderError;
use crate::normalize::{parse_date, parse_hours};
use crate::seed::StageStat;
use crate::tabular::Table;
use crate::upsert::{SqlValue, upsert};

const STAGE: &str = "timesheet";

pub const TIMESHEET_COLUMNS: &[&str] = &[
    "work_date",
    "employee_code",
    "project_id",
    "hours_worked",
    "task_description",
];

/// Natural key is (employee, project, date); hours and task text are the
/// mutable columns on replay. Out-of-range hours are left for the table's
/// CHECK to reject row by row.
pub fn build_rows(table: &Table) -> (Vec<Vec<SqlValue>>, usize) {
    let mut rows = Vec::new();
    let mut skipped = 0usize;

    for row in table.rows() {
        let (Some(code), Some(project)) = (row.get("employee_code"), row.get("project_id"))
        else {
            skipped += 1;
            continue;
        };
        let Some(work_date) = parse_date(row.get("work_date")) else {
            skipped += 1;
            continue;
        };
        let Some(hours) = row.get("hours_worked").and_then(parse_hours) else {
            warn!(employee_code = code, project_id = project, "timesheet row without hours");
            skipped += 1;
            continue;
        };

        rows.push(vec![
            SqlValue::Date(work_date),
            SqlValue::String(code.to_string()),
            SqlValue::String(project.to_string()),
            SqlValue::F64(hours),
            SqlValue::opt_string(row.get("task_description")),
        ]);
    }
    (rows, skipped)
}

pub async fn seed(pool: &MySqlPool, table: &Table) -> Result<StageStat, LoaderError> {
    let (rows, skipped) = build_rows(table);
    let mut stat = StageStat {
        rows_in: table.len(),
        skipped,
        ..StageStat::default()
    };

    let outcome = upsert(pool, "timesheet", TIMESHEET_COLUMNS, &rows, None)
        .await
        .map_err(|e| LoaderError::from_stage(STAGE, e))?;
    stat.absorb(&outcome);
    Ok(stat)
}
