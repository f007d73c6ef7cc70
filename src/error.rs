use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoaderError {
    /// The database cannot be reached at all. Fatal: the run stops here.
    #[error("database unavailable: {0}")]
    Connectivity(sqlx::Error),

    /// One input file could not be read or parsed. That stage is skipped
    /// and the run is marked failed, but other stages still execute.
    #[error("failed to read input {path}: {source}")]
    Input {
        path: String,
        #[source]
        source: csv::Error,
    },

    /// A seeder hit a database error that the row-level fallback could not
    /// absorb. Recorded against the stage; later stages still run.
    #[error("stage {stage} failed: {source}")]
    Stage {
        stage: &'static str,
        #[source]
        source: sqlx::Error,
    },
}

/// Connection-level failures must not be retried row-by-row; everything
/// else (constraint violations, bad values) is recoverable per row.
pub fn is_connectivity(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Configuration(_)
    )
}

impl LoaderError {
    pub fn from_stage(stage: &'static str, source: sqlx::Error) -> Self {
        if is_connectivity(&source) {
            LoaderError::Connectivity(source)
        } else {
            LoaderError::Stage { stage, source }
        }
    }
}
