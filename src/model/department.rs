use sqlx::FromRow;

#[derive(Debug, FromRow)]
pub struct DepartmentRef {
    pub department_id: u64,
    pub department_name: String,
}
