use std::collections::HashMap;

use chrono::NaiveDate;
use sqlx::MySqlPool;
use tracing::{info, warn};

use crate::error::LoaderError;
use crate::model::allocation::ActiveAllocation;
use crate::model::status::Status;
use crate::normalize::{parse_date, parse_hours};
use crate::seed::StageStat;
use crate::tabular::Table;
use crate::upsert::{ConflictPolicy, SqlValue, upsert};

const STAGE: &str = "allocation";

pub const ALLOCATION_COLUMNS: &[&str] = &[
    "employee_code",
    "project_id",
    "allocation_percentage",
    "effective_from",
    "effective_to",
    "status",
    "created_by",
    "change_reason",
];

/// One normalized incoming allocation.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationInput {
    pub employee_code: String,
    pub project_id: String,
    pub percentage: f64,
    pub effective_from: NaiveDate,
    pub effective_to: Option<NaiveDate>,
    pub created_by: Option<String>,
    pub change_reason: Option<String>,
}

pub fn build_inputs(table: &Table) -> (Vec<AllocationInput>, usize) {
    let mut inputs = Vec::new();
    let mut skipped = 0usize;

    for row in table.rows() {
        let (Some(code), Some(project)) = (row.get("employee_code"), row.get("project_id"))
        else {
            skipped += 1;
            continue;
        };
        let Some(effective_from) = parse_date(row.get("effective_from")) else {
            warn!(employee_code = code, project_id = project, "allocation without effective-from date");
            skipped += 1;
            continue;
        };
        let percentage = row
            .get("allocation_percentage")
            .and_then(parse_percentage)
            .unwrap_or(100.0);

        inputs.push(AllocationInput {
            employee_code: code.to_string(),
            project_id: project.to_string(),
            percentage,
            effective_from,
            effective_to: parse_date(row.get("effective_to")),
            created_by: row.get("created_by").map(str::to_string),
            change_reason: row.get("change_reason").map(str::to_string),
        });
    }
    (inputs, skipped)
}

fn parse_percentage(value: &str) -> Option<f64> {
    parse_hours(value.trim_end_matches('%'))
}

/// How each incoming allocation relates to the Active rows already in the
/// table, keyed by (employee, project, effective-from).
#[derive(Debug, Default)]
pub struct Classified {
    pub fresh: Vec<AllocationInput>,
    /// (allocation_id of the row to deactivate, superseding input)
    pub supersede: Vec<(u64, AllocationInput)>,
    pub replays: usize,
}

const PCT_EPSILON: f64 = 0.005;

/// Where a key already classified in this batch ended up, so repeats fold
/// into the pending row instead of producing a second Active one.
enum Slot {
    Fresh(usize),
    Supersede(usize),
    /// Matched the database percentage; kept so a later differing repeat
    /// still knows which row to deactivate.
    Replayed(u64),
}

pub fn classify(
    inputs: Vec<AllocationInput>,
    active: &HashMap<(String, String, NaiveDate), (u64, f64)>,
) -> Classified {
    let mut out = Classified::default();
    let mut pending: HashMap<(String, String, NaiveDate), Slot> = HashMap::new();

    for input in inputs {
        let key = (
            input.employee_code.clone(),
            input.project_id.clone(),
            input.effective_from,
        );

        // Repeats of a key already seen in this file: last value wins, and
        // only one Active row per key can come out of the batch.
        if let Some(slot) = pending.get_mut(&key) {
            let current = match slot {
                Slot::Fresh(i) => out.fresh[*i].percentage,
                Slot::Supersede(i) => out.supersede[*i].1.percentage,
                Slot::Replayed(_) => active[&key].1,
            };
            if (current - input.percentage).abs() < PCT_EPSILON {
                out.replays += 1;
            } else {
                match slot {
                    Slot::Fresh(i) => out.fresh[*i] = input,
                    Slot::Supersede(i) => out.supersede[*i].1 = input,
                    Slot::Replayed(id) => {
                        out.supersede.push((*id, input));
                        *slot = Slot::Supersede(out.supersede.len() - 1);
                    }
                }
                out.replays += 1;
            }
            continue;
        }

        match active.get(&key) {
            None => {
                pending.insert(key, Slot::Fresh(out.fresh.len()));
                out.fresh.push(input);
            }
            Some((id, pct)) if (pct - input.percentage).abs() < PCT_EPSILON => {
                out.replays += 1;
                pending.insert(key, Slot::Replayed(*id));
            }
            Some((id, _)) => {
                pending.insert(key, Slot::Supersede(out.supersede.len()));
                out.supersede.push((*id, input));
            }
        }
    }
    out
}

fn to_row(input: &AllocationInput) -> Vec<SqlValue> {
    vec![
        SqlValue::String(input.employee_code.clone()),
        SqlValue::String(input.project_id.clone()),
        SqlValue::F64(input.percentage),
        SqlValue::Date(input.effective_from),
        SqlValue::opt_date(input.effective_to),
        SqlValue::String(Status::Active.to_string()),
        SqlValue::opt_string(input.created_by.as_deref()),
        SqlValue::opt_string(input.change_reason.as_deref()),
    ]
}

/// Load allocations with append-only versioning. A replayed row (same
/// employee, project, effective-from, percentage) is a no-op; a changed
/// percentage deactivates the old Active row and inserts a fresh one in the
/// same transaction, so history only ever grows.
pub async fn seed(pool: &MySqlPool, table: &Table) -> Result<StageStat, LoaderError> {
    let existing: Vec<ActiveAllocation> = sqlx::query_as(
        "SELECT allocation_id, employee_code, project_id, effective_from, \
                CAST(allocation_percentage AS DOUBLE) AS allocation_percentage \
         FROM project_allocation WHERE status = 'Active'",
    )
    .fetch_all(pool)
    .await
    .map_err(|e| LoaderError::from_stage(STAGE, e))?;

    let active: HashMap<(String, String, NaiveDate), (u64, f64)> = existing
        .into_iter()
        .map(|a| {
            (
                (a.employee_code, a.project_id, a.effective_from),
                (a.allocation_id, a.allocation_percentage),
            )
        })
        .collect();

    let (inputs, skipped) = build_inputs(table);
    let classified = classify(inputs, &active);
    let mut stat = StageStat {
        rows_in: table.len(),
        skipped: skipped + classified.replays,
        ..StageStat::default()
    };
    info!(
        fresh = classified.fresh.len(),
        superseding = classified.supersede.len(),
        replays = classified.replays,
        "classified incoming allocations"
    );

    let fresh_rows: Vec<Vec<SqlValue>> = classified.fresh.iter().map(to_row).collect();
    let outcome = upsert(
        pool,
        "project_allocation",
        ALLOCATION_COLUMNS,
        &fresh_rows,
        Some(ConflictPolicy::Insert),
    )
    .await
    .map_err(|e| LoaderError::from_stage(STAGE, e))?;
    stat.absorb(&outcome);

    for (old_id, input) in &classified.supersede {
        supersede(pool, *old_id, input)
            .await
            .map_err(|e| LoaderError::from_stage(STAGE, e))?;
        stat.accepted += 1;
    }

    Ok(stat)
}

/// Mark the old row Inactive and insert the replacement as one transaction.
/// The old row is never mutated beyond its status flag.
async fn supersede(
    pool: &MySqlPool,
    old_id: u64,
    input: &AllocationInput,
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query("UPDATE project_allocation SET status = ? WHERE allocation_id = ?")
        .bind(Status::Inactive.to_string())
        .bind(old_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        "INSERT INTO project_allocation \
         (employee_code, project_id, allocation_percentage, effective_from, effective_to, \
          status, created_by, change_reason) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&input.employee_code)
    .bind(&input.project_id)
    .bind(input.percentage)
    .bind(input.effective_from)
    .bind(input.effective_to)
    .bind(Status::Active.to_string())
    .bind(input.created_by.as_deref().unwrap_or("system"))
    .bind(input.change_reason.as_deref())
    .execute(&mut *tx)
    .await?;

    tx.commit().await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(code: &str, project: &str, pct: f64) -> AllocationInput {
        AllocationInput {
            employee_code: code.to_string(),
            project_id: project.to_string(),
            percentage: pct,
            effective_from: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            effective_to: None,
            created_by: Some("system".to_string()),
            change_reason: None,
        }
    }

    fn active_map(code: &str, project: &str, id: u64, pct: f64) -> HashMap<(String, String, NaiveDate), (u64, f64)> {
        let mut map = HashMap::new();
        map.insert(
            (
                code.to_string(),
                project.to_string(),
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            ),
            (id, pct),
        );
        map
    }

    #[test]
    fn unchanged_replay_is_a_noop() {
        let classified = classify(vec![input("EMP-001", "PRJ-1", 50.0)], &active_map("EMP-001", "PRJ-1", 9, 50.0));
        assert_eq!(classified.replays, 1);
        assert!(classified.fresh.is_empty());
        assert!(classified.supersede.is_empty());
    }

    #[test]
    fn changed_percentage_supersedes() {
        let classified = classify(vec![input("EMP-001", "PRJ-1", 75.0)], &active_map("EMP-001", "PRJ-1", 9, 50.0));
        assert_eq!(classified.supersede.len(), 1);
        assert_eq!(classified.supersede[0].0, 9);
        assert_eq!(classified.supersede[0].1.percentage, 75.0);
        assert_eq!(classified.replays, 0);
    }

    #[test]
    fn new_combination_is_fresh() {
        let classified = classify(vec![input("EMP-002", "PRJ-1", 100.0)], &active_map("EMP-001", "PRJ-1", 9, 50.0));
        assert_eq!(classified.fresh.len(), 1);
    }

    #[test]
    fn repeated_in_file_rows_collapse_to_one_fresh() {
        let classified = classify(
            vec![input("EMP-001", "PRJ-1", 50.0), input("EMP-001", "PRJ-1", 50.0)],
            &HashMap::new(),
        );
        assert_eq!(classified.fresh.len(), 1);
        assert_eq!(classified.replays, 1);
        assert!(classified.supersede.is_empty());
    }

    #[test]
    fn later_in_file_value_wins_without_a_second_active_row() {
        let classified = classify(
            vec![input("EMP-001", "PRJ-1", 50.0), input("EMP-001", "PRJ-1", 80.0)],
            &HashMap::new(),
        );
        assert_eq!(classified.fresh.len(), 1);
        assert_eq!(classified.fresh[0].percentage, 80.0);
        assert_eq!(classified.replays, 1);
        assert!(classified.supersede.is_empty());
    }

    #[test]
    fn in_file_repeat_after_replay_supersedes_the_stored_row() {
        let classified = classify(
            vec![input("EMP-001", "PRJ-1", 50.0), input("EMP-001", "PRJ-1", 80.0)],
            &active_map("EMP-001", "PRJ-1", 9, 50.0),
        );
        assert!(classified.fresh.is_empty());
        assert_eq!(classified.supersede.len(), 1);
        assert_eq!(classified.supersede[0].0, 9);
        assert_eq!(classified.supersede[0].1.percentage, 80.0);
    }

    #[test]
    fn in_file_repeat_folds_into_pending_supersede() {
        let classified = classify(
            vec![input("EMP-001", "PRJ-1", 75.0), input("EMP-001", "PRJ-1", 60.0)],
            &active_map("EMP-001", "PRJ-1", 9, 50.0),
        );
        assert_eq!(classified.supersede.len(), 1);
        assert_eq!(classified.supersede[0].0, 9);
        assert_eq!(classified.supersede[0].1.percentage, 60.0);
    }

    #[test]
    fn inputs_default_percentage_and_skip_undated() {
        let table = Table::new(
            vec![
                "employee_code".into(),
                "project_id".into(),
                "allocation_percentage".into(),
                "effective_from".into(),
            ],
            vec![
                vec![Some("EMP-001".into()), Some("PRJ-1".into()), None, Some("2024-01-01".into())],
                vec![Some("EMP-002".into()), Some("PRJ-1".into()), Some("60".into()), None],
            ],
        );
        let (inputs, skipped) = build_inputs(&table);
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].percentage, 100.0);
        assert_eq!(skipped, 1);
    }

    #[test]
    fn percentage_tolerates_percent_sign() {
        assert_eq!(parse_percentage("62.5%"), Some(62.5));
        assert_eq!(parse_percentage("40"), Some(40.0));
    }
}
