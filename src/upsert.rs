use chrono::{NaiveDate, NaiveTime};
use sqlx::MySqlPool;
use sqlx::mysql::MySqlArguments;
use sqlx::query::Query;
use sqlx::MySql;
use tracing::{info, warn};

use crate::error::is_connectivity;

/// ===============================
/// SQL bindable value enum
/// ===============================
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    String(String),
    I64(i64),
    U64(u64),
    F64(f64),
    Date(NaiveDate),
    Time(NaiveTime),
    Null,
}

impl SqlValue {
    pub fn opt_string(value: Option<&str>) -> Self {
        match value {
            Some(v) => SqlValue::String(v.to_string()),
            None => SqlValue::Null,
        }
    }

    pub fn opt_date(value: Option<NaiveDate>) -> Self {
        match value {
            Some(d) => SqlValue::Date(d),
            None => SqlValue::Null,
        }
    }

    pub fn opt_time(value: Option<NaiveTime>) -> Self {
        match value {
            Some(t) => SqlValue::Time(t),
            None => SqlValue::Null,
        }
    }

    pub fn opt_u64(value: Option<u64>) -> Self {
        match value {
            Some(v) => SqlValue::U64(v),
            None => SqlValue::Null,
        }
    }
}

/// ===============================
/// Conflict policy registry
/// ===============================
///
/// What to do when an inserted row collides with an existing row under a
/// unique key. Declared statically per table so the behavior is readable
/// here instead of being derived from the constraint catalog at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// `INSERT IGNORE`: first write wins, replays are no-ops.
    DoNothing,
    /// `ON DUPLICATE KEY UPDATE` limited to the named mutable columns.
    UpdateColumns(&'static [&'static str]),
    /// Plain insert; the table has no natural unique key (append-only).
    Insert,
}

pub fn policy_for(table: &str) -> Option<ConflictPolicy> {
    match table {
        "employee_exit" => Some(ConflictPolicy::UpdateColumns(&[
            "exit_date",
            "last_working_date",
            "exit_reason",
            "exit_comments",
        ])),
        "attendance" => Some(ConflictPolicy::UpdateColumns(&[
            "clock_in_time",
            "clock_out_time",
            "attendance_type",
        ])),
        "timesheet" => Some(ConflictPolicy::UpdateColumns(&[
            "hours_worked",
            "task_description",
        ])),
        "department" | "designation" | "employee" | "employee_personal"
        | "employee_financial" | "project" | "resource_utilization" => {
            Some(ConflictPolicy::DoNothing)
        }
        "project_allocation" => Some(ConflictPolicy::Insert),
        _ => None,
    }
}

impl ConflictPolicy {
    fn describe(&self) -> String {
        match self {
            ConflictPolicy::DoNothing => "do-nothing".to_string(),
            ConflictPolicy::UpdateColumns(cols) => format!("update[{}]", cols.join(",")),
            ConflictPolicy::Insert => "plain-insert".to_string(),
        }
    }
}

/// ===============================
/// Statement building
/// ===============================
pub fn build_batch_sql(
    table: &str,
    columns: &[&str],
    row_count: usize,
    policy: ConflictPolicy,
) -> String {
    let placeholders = format!("({})", vec!["?"; columns.len()].join(","));
    let values = vec![placeholders; row_count].join(",");

    let verb = match policy {
        ConflictPolicy::DoNothing => "INSERT IGNORE",
        _ => "INSERT",
    };
    let mut sql = format!("{} INTO {} ({}) VALUES {}", verb, table, columns.join(","), values);

    if let ConflictPolicy::UpdateColumns(update_cols) = policy {
        let assignments = update_cols
            .iter()
            .map(|c| format!("{} = VALUES({})", c, c))
            .collect::<Vec<_>>()
            .join(", ");
        sql.push_str(" ON DUPLICATE KEY UPDATE ");
        sql.push_str(&assignments);
    }
    sql
}

fn build_single_insert_sql(table: &str, columns: &[&str]) -> String {
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        columns.join(","),
        vec!["?"; columns.len()].join(",")
    )
}

fn bind_value<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    value: &SqlValue,
) -> Query<'q, MySql, MySqlArguments> {
    match value {
        SqlValue::String(v) => query.bind(v.clone()),
        SqlValue::I64(v) => query.bind(*v),
        SqlValue::U64(v) => query.bind(*v),
        SqlValue::F64(v) => query.bind(*v),
        SqlValue::Date(v) => query.bind(*v),
        SqlValue::Time(v) => query.bind(*v),
        SqlValue::Null => query.bind(None::<String>),
    }
}

/// ===============================
/// Upsert engine
/// ===============================
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub processed: usize,
    pub accepted: usize,
    pub rejected: usize,
}

// Statements are chunked so placeholder counts stay well under the
// server-side limit; everything still commits together.
const BATCH_CHUNK_ROWS: usize = 1000;
const REJECT_LOG_SAMPLE: usize = 5;

/// Insert `rows` into `table` under the table's declared conflict policy
/// (caller `fallback` applies to tables outside the registry, then plain
/// insert as last resort). The whole row-set goes in as batched statements
/// inside one transaction; if that fails for any non-connectivity reason the
/// transaction is rolled back and every row is retried as its own plain
/// insert, so one malformed row never sinks the batch. Only connectivity
/// failures propagate.
pub async fn upsert(
    pool: &MySqlPool,
    table: &str,
    columns: &[&str],
    rows: &[Vec<SqlValue>],
    fallback: Option<ConflictPolicy>,
) -> Result<UpsertOutcome, sqlx::Error> {
    if rows.is_empty() {
        warn!(table, "no rows to upsert");
        return Ok(UpsertOutcome::default());
    }

    let policy = policy_for(table)
        .or(fallback)
        .unwrap_or(ConflictPolicy::Insert);
    info!(table, policy = %policy.describe(), rows = rows.len(), "upserting batch");

    match run_batch(pool, table, columns, rows, policy).await {
        Ok(()) => {
            info!(table, rows = rows.len(), "batch committed");
            Ok(UpsertOutcome {
                processed: rows.len(),
                accepted: rows.len(),
                rejected: 0,
            })
        }
        Err(e) if is_connectivity(&e) => Err(e),
        Err(e) => {
            warn!(table, error = %e, "batch failed, retrying row by row");
            run_row_fallback(pool, table, columns, rows).await
        }
    }
}

async fn run_batch(
    pool: &MySqlPool,
    table: &str,
    columns: &[&str],
    rows: &[Vec<SqlValue>],
    policy: ConflictPolicy,
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    for chunk in rows.chunks(BATCH_CHUNK_ROWS) {
        let sql = build_batch_sql(table, columns, chunk.len(), policy);
        let mut query = sqlx::query(&sql);
        for row in chunk {
            for value in row {
                query = bind_value(query, value);
            }
        }
        if let Err(e) = query.execute(&mut *tx).await {
            tx.rollback().await.ok();
            return Err(e);
        }
    }

    tx.commit().await
}

async fn run_row_fallback(
    pool: &MySqlPool,
    table: &str,
    columns: &[&str],
    rows: &[Vec<SqlValue>],
) -> Result<UpsertOutcome, sqlx::Error> {
    let sql = build_single_insert_sql(table, columns);
    let mut accepted = 0usize;
    let mut rejected = 0usize;

    for row in rows {
        let mut query = sqlx::query(&sql);
        for value in row {
            query = bind_value(query, value);
        }
        match query.execute(pool).await {
            Ok(_) => accepted += 1,
            Err(e) if is_connectivity(&e) => return Err(e),
            Err(e) => {
                rejected += 1;
                if rejected <= REJECT_LOG_SAMPLE {
                    warn!(table, row = ?&row.get(..2.min(row.len())), error = %e, "row rejected");
                }
            }
        }
    }

    info!(table, accepted, rejected, "row-level fallback completed");
    Ok(UpsertOutcome {
        processed: rows.len(),
        accepted,
        rejected,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_covers_hand_tuned_tables() {
        assert_eq!(
            policy_for("employee_exit"),
            Some(ConflictPolicy::UpdateColumns(&[
                "exit_date",
                "last_working_date",
                "exit_reason",
                "exit_comments",
            ]))
        );
        assert_eq!(policy_for("employee"), Some(ConflictPolicy::DoNothing));
        assert_eq!(policy_for("project_allocation"), Some(ConflictPolicy::Insert));
        assert_eq!(policy_for("no_such_table"), None);
    }

    #[test]
    fn batch_sql_do_nothing() {
        let sql = build_batch_sql("department", &["department_name", "status"], 2, ConflictPolicy::DoNothing);
        assert_eq!(
            sql,
            "INSERT IGNORE INTO department (department_name,status) VALUES (?,?),(?,?)"
        );
    }

    #[test]
    fn batch_sql_update_columns() {
        let sql = build_batch_sql(
            "timesheet",
            &["work_date", "employee_code", "hours_worked"],
            1,
            ConflictPolicy::UpdateColumns(&["hours_worked", "task_description"]),
        );
        assert_eq!(
            sql,
            "INSERT INTO timesheet (work_date,employee_code,hours_worked) VALUES (?,?,?) \
             ON DUPLICATE KEY UPDATE hours_worked = VALUES(hours_worked), \
             task_description = VALUES(task_description)"
        );
    }

    #[test]
    fn batch_sql_plain_insert() {
        let sql = build_batch_sql("project_allocation", &["employee_code"], 3, ConflictPolicy::Insert);
        assert_eq!(
            sql,
            "INSERT INTO project_allocation (employee_code) VALUES (?),(?),(?)"
        );
    }

    #[test]
    fn single_insert_sql_has_no_conflict_clause() {
        let sql = build_single_insert_sql("attendance", &["attendance_date", "employee_code"]);
        assert_eq!(sql, "INSERT INTO attendance (attendance_date,employee_code) VALUES (?,?)");
    }

    #[test]
    fn opt_constructors_map_missing_to_null() {
        assert_eq!(SqlValue::opt_string(None), SqlValue::Null);
        assert_eq!(SqlValue::opt_string(Some("x")), SqlValue::String("x".into()));
        assert_eq!(SqlValue::opt_date(None), SqlValue::Null);
        assert_eq!(SqlValue::opt_u64(Some(7)), SqlValue::U64(7));
    }
}
