use sqlx::FromRow;

#[derive(Debug, FromRow)]
pub struct DesignationRef {
    pub designation_id: u64,
    pub designation_name: String,
}
