use pulsemon_common::retry::RetryError;
use pulsemon_common::types::MetricKind;
use sea_orm::sqlx;
use sea_orm::{DbErr, RuntimeErr};

/// Errors that can occur within the storage layer.
///
/// # Examples
///
/// ```rust
/// use pulsemon_common::types::MetricKind;
/// use pulsemon_storage::error::StorageError;
///
/// let err = StorageError::NotFound {
///     kind: MetricKind::Counter,
///     key: "PollCount".to_string(),
/// };
/// assert!(err.to_string().contains("PollCount"));
/// assert!(err.is_not_found());
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The requested key has no value in the store.
    #[error("Storage: {kind} '{key}' not found")]
    NotFound { kind: MetricKind, key: String },

    /// A value could not be parsed from, or encoded to, its string form.
    #[error("Storage: invalid {kind} value '{value}': {reason}")]
    InvalidValue {
        kind: MetricKind,
        value: String,
        reason: String,
    },

    /// The configured backend is not one this build can serve.
    #[error("Storage: invalid storage type '{0}'")]
    InvalidStorageType(String),

    /// Retry ladder spent while the database kept failing transiently.
    #[error("Storage: max attempts exceeded after {attempts} attempts: {source}")]
    MaxAttemptsExceeded {
        attempts: usize,
        #[source]
        source: Box<StorageError>,
    },

    /// An underlying database error.
    #[error("Storage: database error: {0}")]
    Database(#[from] DbErr),

    /// Snapshot file I/O failure.
    #[error("Storage: I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A snapshot line that does not have the `kind<TAB>key<TAB>value` shape.
    #[error("Storage: malformed snapshot line {line}: '{content}'")]
    MalformedSnapshot { line: usize, content: String },

    /// A snapshot line names a store that was not registered.
    #[error("Storage: no store registered for '{0}'")]
    UnknownStore(String),

    /// Generic configuration error, e.g. a negative flush interval.
    #[error("Storage: invalid configuration: {0}")]
    InvalidConfig(String),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }

    /// Broken-connection class errors that are worth retrying.
    ///
    /// Covers failures to acquire or open a connection and connections that
    /// drop while a statement runs: socket I/O errors, pool timeouts, a
    /// closed pool, and PostgreSQL SQLSTATE class `08`.
    pub fn is_transient(&self) -> bool {
        let StorageError::Database(err) = self else {
            return false;
        };
        match err {
            DbErr::ConnectionAcquire(_) | DbErr::Conn(_) => true,
            DbErr::Exec(RuntimeErr::SqlxError(e)) | DbErr::Query(RuntimeErr::SqlxError(e)) => {
                is_connection_failure(e)
            }
            _ => false,
        }
    }

    /// True when the caller supplied something unusable rather than the
    /// backend failing.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            StorageError::InvalidValue { .. } | StorageError::InvalidStorageType(_)
        )
    }
}

fn is_connection_failure(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => true,
        // SQLSTATE class 08: connection exception.
        sqlx::Error::Database(db) => db.code().is_some_and(|code| code.starts_with("08")),
        _ => false,
    }
}

impl From<RetryError<StorageError>> for StorageError {
    fn from(err: RetryError<StorageError>) -> Self {
        match err {
            RetryError::Permanent(e) => e,
            RetryError::MaxAttemptsExceeded { attempts, source } => {
                StorageError::MaxAttemptsExceeded {
                    attempts,
                    source: Box::new(source),
                }
            }
        }
    }
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
