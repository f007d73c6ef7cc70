use sqlx::MySqlPool;

use crate::error::LoaderError;
use crate::normalize::{parse_date, parse_time};
use crate::seed::StageStat;
use crate::tabular::Table;
use crate::upsert::{SqlValue, upsert};

const STAGE: &str = "attendance";

pub const ATTENDANCE_COLUMNS: &[&str] = &[
    "attendance_date",
    "employee_code",
    "clock_in_time",
    "clock_out_time",
    "attendance_type",
];

/// Attendance exports disagree on column names between report versions;
/// both spellings are accepted. Total hours are derived by the table's
/// generated column, not computed here.
pub fn build_rows(table: &Table) -> (Vec<Vec<SqlValue>>, usize) {
    let mut rows = Vec::new();
    let mut skipped = 0usize;

    for row in table.rows() {
        let Some(code) = row.get("Employee Code") else {
            skipped += 1;
            continue;
        };
        let date_value = row.get("ShiftDate").or_else(|| row.get("Date"));
        let Some(date) = parse_date(date_value) else {
            skipped += 1;
            continue;
        };
        let clock_in = parse_time(row.get("In Time").or_else(|| row.get("Clock-In Time")));
        let clock_out = parse_time(row.get("Out Time").or_else(|| row.get("Clock-Out Time")));

        rows.push(vec![
            SqlValue::Date(date),
            SqlValue::String(code.to_string()),
            SqlValue::opt_time(clock_in),
            SqlValue::opt_time(clock_out),
            SqlValue::String(row.get_or("Status", "Present").to_string()),
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

    let outcome = upsert(pool, "attendance", ATTENDANCE_COLUMNS, &rows, None)
        .await
        .map_err(|e| LoaderError::from_stage(STAGE, e))?;
    stat.absorb(&outcome);
    Ok(stat)
}
