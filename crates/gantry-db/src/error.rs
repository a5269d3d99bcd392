//! Database error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("expected exactly one row to be affected, got {0}")]
    UnexpectedRowCount(u64),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

pub type DbResult<T> = std::result::Result<T, DbError>;

impl From<DbError> for gantry_core::Error {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(msg) => gantry_core::Error::NotFound(msg),
            DbError::Migration(e) => gantry_core::Error::Migration(e.to_string()),
            other => gantry_core::Error::Storage(other.to_string()),
        }
    }
}
