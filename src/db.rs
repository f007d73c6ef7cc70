use sqlx::MySqlPool;
use sqlx::mysql::MySqlPoolOptions;

/// Build the one connection pool for the whole run. The pool is handed
/// down explicitly; nothing in this crate keeps a global handle.
pub async fn init_db(database_url: &str, max_connections: u32) -> Result<MySqlPool, sqlx::Error> {
    MySqlPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}
