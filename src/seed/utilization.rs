use sqlx::MySqlPool;

use crate::error::LoaderError;
use crate::normalize::{parse_date, parse_hours};
use crate::seed::StageStat;
use crate::tabular::Table;
use crate::upsert::{SqlValue, upsert};

const STAGE: &str = "utilization";

pub const UTILIZATION_COLUMNS: &[&str] = &["project_id", "week_start_date", "estimated_hours"];

/// Weekly estimate per project; missing hours default to zero rather than
/// dropping the week.
pub fn build_rows(table: &Table) -> (Vec<Vec<SqlValue>>, usize) {
    let mut rows = Vec::new();
    let mut skipped = 0usize;

    for row in table.rows() {
        let Some(project) = row.get("project_id") else {
            skipped += 1;
            continue;
        };
        let Some(week_start) = parse_date(row.get("week_start_date")) else {
            skipped += 1;
            continue;
        };
        let hours = row
            .get("estimated_hours")
            .and_then(parse_hours)
            .unwrap_or(0.0);

        rows.push(vec![
            SqlValue::String(project.to_string()),
            SqlValue::Date(week_start),
            SqlValue::F64(hours),
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

    let outcome = upsert(pool, "resource_utilization", UTILIZATION_COLUMNS, &rows, None)
        .await
        .map_err(|e| LoaderError::from_stage(STAGE, e))?;
    stat.absorb(&outcome);
    Ok(stat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn missing_hours_default_to_zero() {
        let table = Table::new(
            vec!["project_id".into(), "week_start_date".into(), "estimated_hours".into()],
            vec![
                vec![Some("PRJ-1".into()), Some("2024-01-01".into()), None],
                vec![Some("PRJ-1".into()), None, Some("40".into())],
            ],
        );
        let (rows, skipped) = build_rows(&table);
        assert_eq!(rows.len(), 1);
        assert_eq!(skipped, 1);
        assert_eq!(rows[0][1], SqlValue::Date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()));
        assert_eq!(rows[0][2], SqlValue::F64(0.0));
    }
}
