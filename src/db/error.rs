use diesel::result::DatabaseErrorKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Transaction failed: {0}")]
    TransactionFailed(#[from] diesel::result::Error),

    #[error("Failed to get a database connection: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    #[error("Failed to run migrations: {0}")]
    Migration(String),

    #[error("Entry not found: {0}")]
    NotFound(String),

    #[error("Entry already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    #[error("Failed to query: {0}: {1}")]
    QueryFailed(String, diesel::result::Error),
}

impl DatabaseError {
    /// Wraps a diesel error with the operation that produced it. Unique constraint
    /// violations surface as [DatabaseError::AlreadyExists].
    pub fn query(context: impl Into<String>, err: diesel::result::Error) -> Self {
        match err {
            diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                DatabaseError::AlreadyExists(context.into())
            }
            diesel::result::Error::NotFound => DatabaseError::NotFound(context.into()),
            err => DatabaseError::QueryFailed(context.into(), err),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DatabaseError::NotFound(_))
    }
}
