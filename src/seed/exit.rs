use std::collections::HashSet;

use sqlx::MySqlPool;
use tracing::{info, warn};

use crate::error::LoaderError;
use crate::model::status::Status;
use crate::normalize::parse_date;
use crate::seed::StageStat;
use crate::tabular::Table;
use crate::upsert::{SqlValue, upsert};

const STAGE: &str = "exit";

pub const EXIT_COLUMNS: &[&str] = &[
    "employee_code",
    "exit_date",
    "last_working_date",
    "exit_reason",
    "exit_comments",
];

pub struct ExitRows {
    pub rows: Vec<Vec<SqlValue>>,
    /// Codes whose employee row exists; only these get the status flip.
    pub exited_codes: Vec<String>,
    pub skipped: usize,
}

/// Shape exit rows, dropping codes with no employee record: an exit file
/// routinely mentions people who never made it into the roster load, and
/// that must not abort the stage.
pub fn build_rows(table: &Table, known_codes: &HashSet<String>) -> ExitRows {
    let mut rows = Vec::new();
    let mut exited_codes = Vec::new();
    let mut skipped = 0usize;

    for row in table.rows() {
        let Some(code) = row.get("Employee Code") else {
            skipped += 1;
            continue;
        };
        if !known_codes.contains(code) {
            warn!(employee_code = code, "exit for unknown employee, skipping");
            skipped += 1;
            continue;
        }
        let Some(exit_date) = parse_date(row.get("Exit Date")) else {
            warn!(employee_code = code, "exit row without parseable exit date");
            skipped += 1;
            continue;
        };

        let last_working = parse_date(
            row.get("Last Working Date")
                .or_else(|| row.get("Expected Resignation Date")),
        );
        let reason = row.get_or("Exit Reason", "Resignation");
        let comments = row.get("Exit Comments").map(str::to_string).unwrap_or_else(|| {
            format!("Employee {} resigned", row.get_or("Employee Name", code))
        });

        rows.push(vec![
            SqlValue::String(code.to_string()),
            SqlValue::Date(exit_date),
            SqlValue::opt_date(last_working),
            SqlValue::String(reason.to_string()),
            SqlValue::String(comments),
        ]);
        exited_codes.push(code.to_string());
    }

    ExitRows { rows, exited_codes, skipped }
}

/// Upsert exits (replays refresh the mutable columns), then flip each
/// exited employee to Inactive. The presence of an exit row is the signal
/// that drives the status change.
pub async fn seed(pool: &MySqlPool, table: &Table) -> Result<StageStat, LoaderError> {
    let known_codes: HashSet<String> = sqlx::query_scalar("SELECT employee_code FROM employee")
        .fetch_all(pool)
        .await
        .map_err(|e| LoaderError::from_stage(STAGE, e))?
        .into_iter()
        .collect();

    let built = build_rows(table, &known_codes);
    let mut stat = StageStat {
        rows_in: table.len(),
        skipped: built.skipped,
        ..StageStat::default()
    };

    let outcome = upsert(pool, "employee_exit", EXIT_COLUMNS, &built.rows, None)
        .await
        .map_err(|e| LoaderError::from_stage(STAGE, e))?;
    stat.absorb(&outcome);

    for code in &built.exited_codes {
        sqlx::query("UPDATE employee SET status = ? WHERE employee_code = ?")
            .bind(Status::Inactive.to_string())
            .bind(code)
            .execute(pool)
            .await
            .map_err(|e| LoaderError::from_stage(STAGE, e))?;
    }
    info!(exits = built.exited_codes.len(), "exited employees marked inactive");

    Ok(stat)
}
