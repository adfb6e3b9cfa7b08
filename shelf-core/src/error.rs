use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "database")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[cfg(feature = "database")]
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ScanError {
    /// Cooperative cancellation is not a failure and is never retried.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ScanError::Cancelled(_))
    }
}

impl From<shelf_model::ModelError> for ScanError {
    fn from(err: shelf_model::ModelError) -> Self {
        ScanError::InvalidInput(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
