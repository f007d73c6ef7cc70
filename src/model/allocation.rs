use chrono::NaiveDate;
use sqlx::FromRow;

/// Current Active allocation row, used to decide whether an incoming
/// allocation is a replay or a superseding version.
#[derive(Debug, FromRow)]
pub struct ActiveAllocation {
    pub allocation_id: u64,
    pub employee_code: String,
    pub project_id: String,
    pub effective_from: NaiveDate,
    pub allocation_percentage: f64,
}
