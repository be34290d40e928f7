use crate::db::error::DatabaseError;
use thiserror::Error;

/// Errors returned by the registry services. Every variant other than
/// `Database` and `Archive` describes a caller mistake and is never transient.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid package name: {0}")]
    InvalidName(String),

    #[error("Invalid version: {0}")]
    InvalidVersion(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid chain ID: {0}")]
    InvalidChainId(i64),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Version {version} of {name} already exists")]
    VersionExists { name: String, version: String },

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Not authorized to modify package {0}")]
    Forbidden(String),

    #[error("No verifier registered for chain {0}")]
    ChainNotFound(String),

    #[error("Failed to build archive: {0}")]
    Archive(#[from] std::io::Error),

    #[error(transparent)]
    Database(DatabaseError),
}

impl From<DatabaseError> for RegistryError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::AlreadyExists(what) => RegistryError::AlreadyExists(what),
            DatabaseError::InvalidCursor(cursor) => {
                RegistryError::InvalidRequest(format!("invalid cursor {cursor}"))
            }
            err => RegistryError::Database(err),
        }
    }
}

/// Translates the storage not-found sentinel into [RegistryError::NotFound] for
/// `what`, passing every other storage error through.
pub(crate) fn not_found(what: impl Into<String>) -> impl FnOnce(DatabaseError) -> RegistryError {
    move |err| match err {
        DatabaseError::NotFound(_) => RegistryError::NotFound(what.into()),
        err => RegistryError::from(err),
    }
}
