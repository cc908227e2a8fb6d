use thiserror::Error;

/// Errors from the article store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("invalid article id {0}: must be positive")]
    InvalidId(i64),

    #[error("article not found: {0}")]
    NotFound(String),

    #[error("upsert for external id {external_id} returned no row")]
    UpsertMissing { external_id: i64 },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}
