use std::collections::BTreeMap;
use std::collections::HashMap;

use serde::Serialize;
use sqlx::MySqlPool;
use strum_macros::{Display, EnumString};
use tracing::{info, warn};

use crate::error::LoaderError;
use crate::normalize::parse_hours;
use crate::seed::{self, StageStat};
use crate::seed::reference::ReferenceMaps;
use crate::tabular::Table;

/// The recognized upload types, in no particular order; seeding order is
/// fixed separately in `run`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum FileType {
    EmployeeMaster,
    EmployeeExit,
    ExperienceReport,
    WorkProfile,
    AttendanceReport,
    TimesheetReport,
    ProjectAllocations,
    ResourceUtilization,
}

/// Required columns per type, checked after remapping. A file missing any
/// of these is skipped with a logged reason, never a pipeline abort.
pub fn required_columns(file_type: FileType) -> &'static [&'static str] {
    match file_type {
        FileType::EmployeeMaster => &[
            "Employee Code",
            "Employee Name",
            "Email",
            "Date Of Joining",
            "Employee Type",
            "Department",
            "Designation",
        ],
        FileType::EmployeeExit => &["Employee Code", "Exit Date"],
        FileType::ExperienceReport => &["Employee Code", "Current Experience", "Past Experience"],
        FileType::WorkProfile => &["Employee Code"],
        FileType::AttendanceReport => &["Employee Code"],
        FileType::TimesheetReport => &["work_date", "employee_code", "project_id", "hours_worked"],
        FileType::ProjectAllocations => &["employee_code", "project_id", "effective_from"],
        FileType::ResourceUtilization => &["project_id", "week_start_date"],
    }
}

/// Allocation exports come from a staffing sheet that names people instead
/// of coding them; the employee master is the lookup. Externally named
/// columns are renamed to the internal schema.
pub fn remap_allocations(table: &mut Table, roster: Option<&Table>) {
    if table.missing_columns(&["employee_code"]).is_empty() {
        // Already in internal shape.
    } else if let Some(roster) = roster {
        let name_to_code: HashMap<String, String> = roster
            .rows()
            .filter_map(|r| {
                Some((
                    r.get("Employee Name")?.to_string(),
                    r.get("Employee Code")?.to_string(),
                ))
            })
            .collect();

        let mut unmapped = 0usize;
        let codes: Vec<Option<String>> = table
            .rows()
            .map(|r| {
                let code = r.get("Name").and_then(|n| name_to_code.get(n)).cloned();
                if code.is_none() {
                    unmapped += 1;
                }
                code
            })
            .collect();
        if unmapped > 0 {
            warn!(unmapped, "allocation rows whose employee name has no code");
        }
        table.set_column("employee_code", codes);
    } else {
        warn!("allocations reference employees by name but no employee master was supplied");
    }

    table.rename_columns(&[
        ("Project Code", "project_id"),
        ("Project Name", "project_name"),
        ("% Allocation", "allocation_percentage"),
        ("Available From", "effective_from"),
        ("Comments", "change_reason"),
    ]);

    let row_count = table.len();
    if !table.missing_columns(&["created_by"]).is_empty() {
        table.set_column("created_by", vec![Some("system".to_string()); row_count]);
    }
}

/// Timesheet exports use tracker column names and minutes instead of hours.
pub fn remap_timesheet(table: &mut Table) {
    let duration_in_minutes = table.missing_columns(&["Duration in minutes"]).is_empty();

    table.rename_columns(&[
        ("Project", "project_id"),
        ("Task", "task_description"),
        ("Contributor", "employee_code"),
        ("Date", "work_date"),
        ("Duration in minutes", "hours_worked"),
    ]);

    if duration_in_minutes {
        let hours: Vec<Option<String>> = table
            .rows()
            .map(|r| {
                r.get("hours_worked")
                    .and_then(parse_hours)
                    .map(|minutes| format!("{}", minutes / 60.0))
            })
            .collect();
        table.set_column("hours_worked", hours);
    }
}

#[derive(Debug, Default, Serialize)]
pub struct PipelineStats {
    pub files_processed: usize,
    pub stages: BTreeMap<String, StageStat>,
}

/// The contract the presentation layer consumes: an aggregate verdict, a
/// human-readable message, and per-stage counts.
#[derive(Debug)]
pub struct PipelineOutcome {
    pub success: bool,
    pub message: String,
    pub stats: PipelineStats,
}

struct RunState {
    stats: PipelineStats,
    failures: Vec<String>,
}

impl RunState {
    fn record(&mut self, stage: &str, result: Result<StageStat, LoaderError>) -> Result<(), LoaderError> {
        match result {
            Ok(stat) => {
                self.stats.stages.insert(stage.to_string(), stat);
                Ok(())
            }
            Err(LoaderError::Connectivity(e)) => Err(LoaderError::Connectivity(e)),
            Err(e) => {
                warn!(stage, error = %e, "stage failed, continuing with later stages");
                self.failures.push(format!("{}: {}", stage, e));
                Ok(())
            }
        }
    }

    fn skip(&mut self, stage: &str, reason: String) {
        warn!(stage, reason = %reason, "stage skipped");
        self.stats
            .stages
            .insert(stage.to_string(), StageStat::skipped_because(reason));
    }
}

/// Returns the table only when it carries every required column; otherwise
/// records the skip and returns None.
fn gate<'a>(
    state: &mut RunState,
    stage: &str,
    file_type: FileType,
    table: Option<&'a Table>,
) -> Option<&'a Table> {
    let table = table?;
    let missing = table.missing_columns(required_columns(file_type));
    if missing.is_empty() {
        Some(table)
    } else {
        state.skip(stage, format!("missing required columns: {}", missing.join(", ")));
        None
    }
}

/// Run the whole load in the fixed dependency order. Each stage commits
/// independently: a failure partway leaves earlier stages persisted and the
/// aggregate outcome reports best effort, not all-or-nothing. Only a
/// connectivity failure aborts the run.
pub async fn run(
    pool: &MySqlPool,
    mut inputs: BTreeMap<FileType, Table>,
) -> Result<PipelineOutcome, LoaderError> {
    let mut state = RunState {
        stats: PipelineStats {
            files_processed: inputs.len(),
            stages: BTreeMap::new(),
        },
        failures: Vec::new(),
    };
    info!(
        files = inputs.len(),
        types = ?inputs.keys().collect::<Vec<_>>(),
        "starting load pipeline"
    );

    // Remaps happen up front so the column gate sees the internal names.
    let roster = inputs.remove(&FileType::EmployeeMaster);
    if let Some(mut allocations) = inputs.remove(&FileType::ProjectAllocations) {
        remap_allocations(&mut allocations, roster.as_ref());
        inputs.insert(FileType::ProjectAllocations, allocations);
    }
    if let Some(mut timesheet) = inputs.remove(&FileType::TimesheetReport) {
        remap_timesheet(&mut timesheet);
        inputs.insert(FileType::TimesheetReport, timesheet);
    }

    // Reference data and employees come first; everything else keys off
    // employee codes and project ids.
    let mut refs = ReferenceMaps::default();
    if let Some(roster) = gate(&mut state, "reference", FileType::EmployeeMaster, roster.as_ref()) {
        match seed::reference::resolve(pool, roster).await {
            Ok((maps, stat)) => {
                refs = maps;
                state.stats.stages.insert("reference".to_string(), stat);
            }
            Err(LoaderError::Connectivity(e)) => return Err(LoaderError::Connectivity(e)),
            Err(e) => {
                warn!(error = %e, "reference stage failed");
                state.failures.push(format!("reference: {}", e));
            }
        }

        let result = seed::employee::seed(pool, roster, &refs).await;
        state.record("employee", result)?;
    }

    if let Some(table) = gate(
        &mut state,
        "experience",
        FileType::ExperienceReport,
        inputs.get(&FileType::ExperienceReport),
    ) {
        let result = seed::employee::update_experience(pool, table).await;
        state.record("experience", result)?;
    }

    if let Some(table) = gate(
        &mut state,
        "work_profile",
        FileType::WorkProfile,
        inputs.get(&FileType::WorkProfile),
    ) {
        let result = seed::employee::update_work_profiles(pool, table, &refs).await;
        state.record("work_profile", result)?;
    }

    if let Some(table) = gate(
        &mut state,
        "exit",
        FileType::EmployeeExit,
        inputs.get(&FileType::EmployeeExit),
    ) {
        let result = seed::exit::seed(pool, table).await;
        state.record("exit", result)?;
    }

    // Projects must exist before allocations and timesheets reference them.
    if let Some(table) = gate(
        &mut state,
        "project",
        FileType::TimesheetReport,
        inputs.get(&FileType::TimesheetReport),
    ) {
        let result = seed::project::seed(pool, table).await;
        state.record("project", result)?;
    }

    if let Some(table) = gate(
        &mut state,
        "allocation",
        FileType::ProjectAllocations,
        inputs.get(&FileType::ProjectAllocations),
    ) {
        let result = seed::allocation::seed(pool, table).await;
        state.record("allocation", result)?;
    }

    if let Some(table) = gate(
        &mut state,
        "attendance",
        FileType::AttendanceReport,
        inputs.get(&FileType::AttendanceReport),
    ) {
        let result = seed::attendance::seed(pool, table).await;
        state.record("attendance", result)?;
    }

    if let Some(table) = gate(
        &mut state,
        "timesheet",
        FileType::TimesheetReport,
        inputs.get(&FileType::TimesheetReport),
    ) {
        let result = seed::timesheet::seed(pool, table).await;
        state.record("timesheet", result)?;
    }

    if let Some(table) = gate(
        &mut state,
        "utilization",
        FileType::ResourceUtilization,
        inputs.get(&FileType::ResourceUtilization),
    ) {
        let result = seed::utilization::seed(pool, table).await;
        state.record("utilization", result)?;
    }

    let success = state.failures.is_empty();
    let message = if success {
        "Data loaded successfully".to_string()
    } else {
        format!("Data loading failed: {}", state.failures.join("; "))
    };
    info!(success, %message, "pipeline finished");

    Ok(PipelineOutcome {
        success,
        message,
        stats: state.stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn file_type_round_trips_snake_case() {
        assert_eq!(FileType::EmployeeMaster.to_string(), "employee_master");
        assert_eq!(
            FileType::from_str("project_allocations").unwrap(),
            FileType::ProjectAllocations
        );
        assert!(FileType::from_str("payroll").is_err());
    }

    #[test]
    fn remap_timesheet_renames_and_converts_minutes() {
        let mut table = Table::new(
            vec![
                "Project".into(),
                "Task".into(),
                "Contributor".into(),
                "Date".into(),
                "Duration in minutes".into(),
            ],
            vec![vec![
                Some("PRJ-1".into()),
                Some("review".into()),
                Some("EMP-001".into()),
                Some("2024-01-15".into()),
                Some("90".into()),
            ]],
        );
        remap_timesheet(&mut table);
        let rows: Vec<_> = table.rows().collect();
        assert_eq!(rows[0].get("project_id"), Some("PRJ-1"));
        assert_eq!(rows[0].get("hours_worked"), Some("1.5"));
    }

    #[test]
    fn remap_timesheet_leaves_hour_columns_alone() {
        let mut table = Table::new(
            vec!["project_id".into(), "employee_code".into(), "work_date".into(), "hours_worked".into()],
            vec![vec![
                Some("PRJ-1".into()),
                Some("EMP-001".into()),
                Some("2024-01-15".into()),
                Some("7.5".into()),
            ]],
        );
        remap_timesheet(&mut table);
        let rows: Vec<_> = table.rows().collect();
        assert_eq!(rows[0].get("hours_worked"), Some("7.5"));
    }

    #[test]
    fn remap_allocations_maps_names_to_codes() {
        let roster = Table::new(
            vec!["Employee Code".into(), "Employee Name".into()],
            vec![
                vec![Some("EMP-001".into()), Some("Asha".into())],
                vec![Some("EMP-002".into()), Some("Ravi".into())],
            ],
        );
        let mut allocations = Table::new(
            vec![
                "Name".into(),
                "Project Code".into(),
                "% Allocation".into(),
                "Available From".into(),
                "Comments".into(),
            ],
            vec![
                vec![
                    Some("Asha".into()),
                    Some("PRJ-1".into()),
                    Some("50".into()),
                    Some("2024-01-01".into()),
                    None,
                ],
                vec![
                    Some("Stranger".into()),
                    Some("PRJ-2".into()),
                    Some("100".into()),
                    Some("2024-02-01".into()),
                    Some("new hire".into()),
                ],
            ],
        );
        remap_allocations(&mut allocations, Some(&roster));

        let rows: Vec<_> = allocations.rows().collect();
        assert_eq!(rows[0].get("employee_code"), Some("EMP-001"));
        assert_eq!(rows[1].get("employee_code"), None);
        assert_eq!(rows[0].get("project_id"), Some("PRJ-1"));
        assert_eq!(rows[0].get("allocation_percentage"), Some("50"));
        assert_eq!(rows[1].get("change_reason"), Some("new hire"));
        assert_eq!(rows[0].get("created_by"), Some("system"));
    }

    #[test]
    fn required_columns_gate_internal_names_for_remapped_types() {
        assert!(required_columns(FileType::TimesheetReport).contains(&"employee_code"));
        assert!(required_columns(FileType::EmployeeMaster).contains(&"Employee Code"));
        assert!(required_columns(FileType::EmployeeMaster).contains(&"Email"));
    }
}
