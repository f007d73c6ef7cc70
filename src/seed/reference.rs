use std::collections::{HashMap, HashSet};

use sqlx::MySqlPool;
use tracing::info;

use crate::error::LoaderError;
use crate::model::department::DepartmentRef;
use crate::model::designation::DesignationRef;
use crate::model::status::Status;
use crate::seed::StageStat;
use crate::tabular::Table;
use crate::upsert::{SqlValue, upsert};

const STAGE: &str = "reference";

pub const DEPARTMENT_COLUMNS: &[&str] =
    &["department_name", "business_unit", "parent_department", "status"];
pub const DESIGNATION_COLUMNS: &[&str] = &["designation_name", "level", "status"];

/// Name-to-id maps for the organizational reference tables. Built after the
/// write so ids are correct even for rows skipped as duplicates.
#[derive(Debug, Default)]
pub struct ReferenceMaps {
    pub departments: HashMap<String, u64>,
    pub designations: HashMap<String, u64>,
}

impl ReferenceMaps {
    pub fn department_id(&self, name: Option<&str>) -> Option<u64> {
        name.and_then(|n| self.departments.get(n).copied())
    }

    pub fn designation_id(&self, name: Option<&str>) -> Option<u64> {
        name.and_then(|n| self.designations.get(n).copied())
    }
}

/// Distinct (department, business unit, parent department) triples from the
/// roster. Rows with no department name carry nothing to derive.
pub fn department_rows(roster: &Table) -> Vec<Vec<SqlValue>> {
    let mut seen = HashSet::new();
    let mut rows = Vec::new();
    for row in roster.rows() {
        let Some(name) = row.get("Department") else { continue };
        let business_unit = row.get("Business Unit");
        let parent = row.get("Parent Department");
        let key = (
            name.to_string(),
            business_unit.map(str::to_string),
            parent.map(str::to_string),
        );
        if seen.insert(key) {
            rows.push(vec![
                SqlValue::String(name.to_string()),
                SqlValue::opt_string(business_unit),
                SqlValue::opt_string(parent),
                SqlValue::String(Status::Active.to_string()),
            ]);
        }
    }
    rows
}

/// Distinct designation names; level is not in the roster so every new
/// designation lands as "Mid".
pub fn designation_rows(roster: &Table) -> Vec<Vec<SqlValue>> {
    let mut seen = HashSet::new();
    let mut rows = Vec::new();
    for row in roster.rows() {
        let Some(name) = row.get("Designation") else { continue };
        if seen.insert(name.to_string()) {
            rows.push(vec![
                SqlValue::String(name.to_string()),
                SqlValue::String("Mid".to_string()),
                SqlValue::String(Status::Active.to_string()),
            ]);
        }
    }
    rows
}

/// Derive departments and designations from the roster, write them, then
/// re-read both tables in full to build the name-to-id maps.
pub async fn resolve(
    pool: &MySqlPool,
    roster: &Table,
) -> Result<(ReferenceMaps, StageStat), LoaderError> {
    let mut stat = StageStat::default();

    let departments = department_rows(roster);
    let designations = designation_rows(roster);
    stat.rows_in = departments.len() + designations.len();

    let outcome = upsert(pool, "department", DEPARTMENT_COLUMNS, &departments, None)
        .await
        .map_err(|e| LoaderError::from_stage(STAGE, e))?;
    stat.absorb(&outcome);

    let outcome = upsert(pool, "designation", DESIGNATION_COLUMNS, &designations, None)
        .await
        .map_err(|e| LoaderError::from_stage(STAGE, e))?;
    stat.absorb(&outcome);

    let maps = read_maps(pool)
        .await
        .map_err(|e| LoaderError::from_stage(STAGE, e))?;
    info!(
        departments = maps.departments.len(),
        designations = maps.designations.len(),
        "reference maps resolved"
    );

    Ok((maps, stat))
}

async fn read_maps(pool: &MySqlPool) -> Result<ReferenceMaps, sqlx::Error> {
    let departments: Vec<DepartmentRef> =
        sqlx::query_as("SELECT department_id, department_name FROM department")
            .fetch_all(pool)
            .await?;
    let designations: Vec<DesignationRef> =
        sqlx::query_as("SELECT designation_id, designation_name FROM designation")
            .fetch_all(pool)
            .await?;

    Ok(ReferenceMaps {
        departments: departments
            .into_iter()
            .map(|d| (d.department_name, d.department_id))
            .collect(),
        designations: designations
            .into_iter()
            .map(|d| (d.designation_name, d.designation_id))
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster() -> Table {
        Table::new(
            vec![
                "Employee Code".into(),
                "Department".into(),
                "Business Unit".into(),
                "Parent Department".into(),
                "Designation".into(),
            ],
            vec![
                vec![
                    Some("EMP-001".into()),
                    Some("Engineering".into()),
                    Some("Technology".into()),
                    None,
                    Some("Developer".into()),
                ],
                vec![
                    Some("EMP-002".into()),
                    Some("Engineering".into()),
                    Some("Technology".into()),
                    None,
                    Some("Developer".into()),
                ],
                vec![
                    Some("EMP-003".into()),
                    Some("Finance".into()),
                    Some("Operations".into()),
                    Some("Corporate".into()),
                    Some("Analyst".into()),
                ],
                vec![Some("EMP-004".into()), None, None, None, None],
            ],
        )
    }

    #[test]
    fn departments_are_distinct_triples() {
        let rows = department_rows(&roster());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0], SqlValue::String("Engineering".into()));
        assert_eq!(rows[1][2], SqlValue::String("Corporate".into()));
    }

    #[test]
    fn designations_are_distinct_names_with_default_level() {
        let rows = designation_rows(&roster());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][1], SqlValue::String("Mid".into()));
    }

    #[test]
    fn maps_resolve_missing_names_to_none() {
        let mut maps = ReferenceMaps::default();
        maps.departments.insert("Engineering".into(), 7);
        assert_eq!(maps.department_id(Some("Engineering")), Some(7));
        assert_eq!(maps.department_id(Some("Ghost")), None);
        assert_eq!(maps.department_id(None), None);
    }
}
