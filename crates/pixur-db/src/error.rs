use pixur_types::Status;
use thiserror::Error;

/// Raw failure reported by a driver.
///
/// Adapters classify these as retryable or permanent; the rest of the system
/// only ever sees them as the cause of a [`Status`].
#[derive(Debug, Error)]
pub enum DbError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    /// A failure from an out-of-tree driver, keyed by SQLSTATE or vendor code.
    #[error("driver error {code}: {message}")]
    Driver { code: String, message: String },

    #[error("transaction already finished")]
    TxDone,

    #[error("database is closed")]
    Closed,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("no current row")]
    NoRow,

    #[error("connection lock poisoned: {0}")]
    Poisoned(String),
}

impl DbError {
    pub fn driver(code: impl Into<String>, message: impl Into<String>) -> Self {
        DbError::Driver {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<DbError> for Status {
    fn from(err: DbError) -> Self {
        match err {
            DbError::DeadlineExceeded => Status::aborted("deadline exceeded").with_cause(err),
            err => Status::internal(err.to_string()).with_cause(err),
        }
    }
}
