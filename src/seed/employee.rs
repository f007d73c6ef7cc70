use std::collections::HashSet;

use sqlx::MySqlPool;
use tracing::{info, warn};

use crate::error::LoaderError;
use crate::model::status::Status;
use crate::normalize::{disambiguate_identifier, parse_date, parse_experience};
use crate::seed::StageStat;
use crate::seed::reference::ReferenceMaps;
use crate::tabular::Table;
use crate::upsert::{SqlValue, upsert};

const STAGE: &str = "employee";

pub const EMPLOYEE_COLUMNS: &[&str] = &[
    "employee_code",
    "employee_name",
    "email",
    "mobile_number",
    "date_of_joining",
    "employee_type",
    "grade",
    "status",
    "department_id",
    "department_name",
    "designation_id",
    "primary_manager_id",
    "past_experience",
    "current_experience",
];
pub const PERSONAL_COLUMNS: &[&str] = &[
    "employee_code",
    "gender",
    "date_of_birth",
    "marital_status",
    "present_address",
    "permanent_address",
    "pan_number",
    "aadhaar_number",
];
pub const FINANCIAL_COLUMNS: &[&str] =
    &["employee_code", "bank_name", "account_number", "ifsc_code"];

/// One roster row fans out into three target rows.
#[derive(Debug, Default)]
pub struct EmployeeRowSets {
    pub employees: Vec<Vec<SqlValue>>,
    pub personal: Vec<Vec<SqlValue>>,
    pub financial: Vec<Vec<SqlValue>>,
    pub skipped: usize,
}

/// Shape the roster into employee / personal / financial row-sets. Identity
/// documents that collide within the batch are disambiguated so the UNIQUE
/// columns on employee_personal cannot sink otherwise valid rows; experience
/// starts at zero and is filled by the experience report stage.
pub fn build_rows(roster: &Table, refs: &ReferenceMaps) -> EmployeeRowSets {
    let mut out = EmployeeRowSets::default();
    let mut taken_pan: HashSet<String> = HashSet::new();
    let mut taken_aadhaar: HashSet<String> = HashSet::new();

    for row in roster.rows() {
        let Some(code) = row.get("Employee Code") else {
            out.skipped += 1;
            continue;
        };

        let status = Status::from_source(row.get("Status"));
        let department = row.get("Department");

        out.employees.push(vec![
            SqlValue::String(code.to_string()),
            SqlValue::opt_string(row.get("Employee Name")),
            SqlValue::opt_string(row.get("Email")),
            SqlValue::opt_string(row.get("Mobile Number")),
            SqlValue::opt_date(parse_date(row.get("Date Of Joining"))),
            SqlValue::String(row.get_or("Employee Type", "Regular").to_string()),
            SqlValue::opt_string(row.get("Grade")),
            SqlValue::String(status.to_string()),
            SqlValue::opt_u64(refs.department_id(department)),
            SqlValue::opt_string(department),
            SqlValue::opt_u64(refs.designation_id(row.get("Designation"))),
            SqlValue::Null, // manager linkage is not in the roster export
            SqlValue::F64(0.0),
            SqlValue::F64(0.0),
        ]);

        let pan = row.get("PAN Number").map(|v| {
            let value = disambiguate_identifier(v, &taken_pan);
            taken_pan.insert(value.clone());
            value
        });
        let aadhaar = row.get("Aadhaar Number").map(|v| {
            let value = disambiguate_identifier(v, &taken_aadhaar);
            taken_aadhaar.insert(value.clone());
            value
        });

        out.personal.push(vec![
            SqlValue::String(code.to_string()),
            SqlValue::opt_string(row.get("Gender")),
            SqlValue::opt_date(parse_date(row.get("Date Of Birth"))),
            SqlValue::opt_string(row.get("Marital Status")),
            SqlValue::opt_string(row.get("Present Address")),
            SqlValue::opt_string(row.get("Permanent Address")),
            SqlValue::opt_string(pan.as_deref()),
            SqlValue::opt_string(aadhaar.as_deref()),
        ]);

        out.financial.push(vec![
            SqlValue::String(code.to_string()),
            SqlValue::opt_string(row.get("Bank Name")),
            SqlValue::opt_string(row.get("Account Number")),
            SqlValue::opt_string(row.get("IFSC Code")),
        ]);
    }
    out
}

/// Load the roster: employee rows first, then the one-to-one extensions.
pub async fn seed(
    pool: &MySqlPool,
    roster: &Table,
    refs: &ReferenceMaps,
) -> Result<StageStat, LoaderError> {
    let rows = build_rows(roster, refs);
    let mut stat = StageStat {
        rows_in: roster.len(),
        skipped: rows.skipped,
        ..StageStat::default()
    };

    for (table, columns, data) in [
        ("employee", EMPLOYEE_COLUMNS, &rows.employees),
        ("employee_personal", PERSONAL_COLUMNS, &rows.personal),
        ("employee_financial", FINANCIAL_COLUMNS, &rows.financial),
    ] {
        let outcome = upsert(pool, table, columns, data, None)
            .await
            .map_err(|e| LoaderError::from_stage(STAGE, e))?;
        stat.absorb(&outcome);
    }

    Ok(stat)
}

/// Experience report stage: per-employee UPDATE of the two experience
/// columns. Unknown codes are logged and skipped; the employee row must
/// already exist.
pub async fn update_experience(pool: &MySqlPool, report: &Table) -> Result<StageStat, LoaderError> {
    let mut stat = StageStat {
        rows_in: report.len(),
        ..StageStat::default()
    };

    for row in report.rows() {
        let Some(code) = row.get("Employee Code") else {
            stat.skipped += 1;
            continue;
        };
        let current = parse_experience(row.get_or("Current Experience", ""));
        let past = parse_experience(row.get_or("Past Experience", ""));

        let result = sqlx::query(
            "UPDATE employee SET current_experience = ?, past_experience = ? WHERE employee_code = ?",
        )
        .bind(current)
        .bind(past)
        .bind(code)
        .execute(pool)
        .await
        .map_err(|e| LoaderError::from_stage("experience", e))?;

        if result.rows_affected() == 0 {
            warn!(employee_code = code, "experience update for unknown employee");
            stat.skipped += 1;
        } else {
            stat.accepted += 1;
        }
    }

    info!(updated = stat.accepted, skipped = stat.skipped, "experience update complete");
    Ok(stat)
}

/// Work profile stage: fill in department/designation assignments for
/// employees whose roster row had none. COALESCE keeps existing values.
pub async fn update_work_profiles(
    pool: &MySqlPool,
    profiles: &Table,
    refs: &ReferenceMaps,
) -> Result<StageStat, LoaderError> {
    let mut stat = StageStat {
        rows_in: profiles.len(),
        ..StageStat::default()
    };

    for row in profiles.rows() {
        let Some(code) = row.get("Employee Code") else {
            stat.skipped += 1;
            continue;
        };
        let department = row.get("Assigned Department");

        let result = sqlx::query(
            "UPDATE employee \
             SET department_id = COALESCE(?, department_id), \
                 department_name = COALESCE(?, department_name), \
                 designation_id = COALESCE(?, designation_id) \
             WHERE employee_code = ?",
        )
        .bind(refs.department_id(department))
        .bind(department)
        .bind(refs.designation_id(row.get("Designation")))
        .bind(code)
        .execute(pool)
        .await
        .map_err(|e| LoaderError::from_stage("work_profile", e))?;

        if result.rows_affected() == 0 {
            stat.skipped += 1;
        } else {
            stat.accepted += 1;
        }
    }

    Ok(stat)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster() -> Table {
        Table::new(
            vec![
                "Employee Code".into(),
                "Employee Name".into(),
                "Date Of Joining".into(),
                "Department".into(),
                "Designation".into(),
                "Status".into(),
                "Aadhaar Number".into(),
                "PAN Number".into(),
            ],
            vec![
                vec![
                    Some("EMP-001".into()),
                    Some("Asha".into()),
                    Some("15-01-2024".into()),
                    Some("Engineering".into()),
                    Some("Developer".into()),
                    None,
                    Some("123456789012".into()),
                    Some("ABCPE1234F".into()),
                ],
                vec![
                    Some("EMP-002".into()),
                    Some("Ravi".into()),
                    Some("2023-06-01".into()),
                    Some("Ghost Dept".into()),
                    None,
                    Some("inactive".into()),
                    Some("123456789012".into()),
                    None,
                ],
                vec![None, Some("No Code".into()), None, None, None, None, None, None],
            ],
        )
    }

    fn refs() -> ReferenceMaps {
        let mut maps = ReferenceMaps::default();
        maps.departments.insert("Engineering".into(), 1);
        maps.designations.insert("Developer".into(), 2);
        maps
    }

    #[test]
    fn splits_into_three_row_sets() {
        let rows = build_rows(&roster(), &refs());
        assert_eq!(rows.employees.len(), 2);
        assert_eq!(rows.personal.len(), 2);
        assert_eq!(rows.financial.len(), 2);
        assert_eq!(rows.skipped, 1);
    }

    #[test]
    fn status_defaults_and_inactive_marker() {
        let rows = build_rows(&roster(), &refs());
        assert_eq!(rows.employees[0][7], SqlValue::String("Active".into()));
        assert_eq!(rows.employees[1][7], SqlValue::String("Inactive".into()));
    }

    #[test]
    fn unknown_department_resolves_to_null_fk() {
        let rows = build_rows(&roster(), &refs());
        assert_eq!(rows.employees[0][8], SqlValue::U64(1));
        assert_eq!(rows.employees[1][8], SqlValue::Null);
        // The free-text name is still carried.
        assert_eq!(rows.employees[1][9], SqlValue::String("Ghost Dept".into()));
    }

    #[test]
    fn colliding_aadhaar_is_disambiguated() {
        let rows = build_rows(&roster(), &refs());
        let first = &rows.personal[0][7];
        let second = &rows.personal[1][7];
        assert_eq!(*first, SqlValue::String("123456789012".into()));
        assert_eq!(*second, SqlValue::String("123456789013".into()));
    }

    #[test]
    fn experience_starts_at_zero() {
        let rows = build_rows(&roster(), &refs());
        assert_eq!(rows.employees[0][12], SqlValue::F64(0.0));
        assert_eq!(rows.employees[0][13], SqlValue::F64(0.0));
    }
}
