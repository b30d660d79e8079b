use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// Origin or destination unreachable.
    #[error("Connection error: {0}")]
    Connection(String),

    /// DDL failure while shaping the destination.
    #[error("Schema error: {0}")]
    Schema(String),

    /// Network/HTTP failure inside one extraction window.
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// One malformed record or element.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Duplicate key, FK or NOT NULL violation at load.
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl SyncError {
    /// Errors that abort the whole run instead of a single unit.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::Connection(_) | SyncError::Schema(_) | SyncError::Configuration(_)
        )
    }
}

impl From<rusqlite::Error> for SyncError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, _)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                SyncError::ConstraintViolation(err.to_string())
            }
            rusqlite::Error::SqliteFailure(code, _)
                if code.code == rusqlite::ErrorCode::CannotOpen =>
            {
                SyncError::Connection(err.to_string())
            }
            _ => SyncError::Database(err.to_string()),
        }
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) => match db.kind() {
                sqlx::error::ErrorKind::UniqueViolation
                | sqlx::error::ErrorKind::ForeignKeyViolation
                | sqlx::error::ErrorKind::NotNullViolation
                | sqlx::error::ErrorKind::CheckViolation => {
                    SyncError::ConstraintViolation(err.to_string())
                }
                _ => SyncError::Database(err.to_string()),
            },
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed => SyncError::Connection(err.to_string()),
            _ => SyncError::Database(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
