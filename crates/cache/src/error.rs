//! Datastore Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A datastore error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for datastore operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("database error")]
    Database,
    #[display("database migration error")]
    Migration,
    /// The datastore could not be reached, or was too busy to answer.
    #[display("datastore unavailable")]
    Unavailable,
    /// A stored value could not be converted to or from its model.
    #[display("invalid datastore data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable)
    }

    /// Wrap an `sqlx` error, classifying lock contention and connection
    /// trouble as [`Unavailable`](Self::Unavailable).
    #[track_caller]
    pub(crate) fn database(err: sqlx::Error) -> Error {
        let transient = match &err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => true,
            // SQLITE_BUSY (5) and SQLITE_LOCKED (6), including extended codes.
            sqlx::Error::Database(db) => db
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                .is_some_and(|code| matches!(code & 0xFF, 5 | 6)),
            _ => false,
        };
        exn::Exn::from(err).raise(if transient { Self::Unavailable } else { Self::Database })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unavailable_is_retryable() {
        assert!(ErrorKind::Unavailable.is_retryable());
        assert!(!ErrorKind::Database.is_retryable());
        assert!(!ErrorKind::InvalidData("path").is_retryable());
    }

    #[test]
    fn pool_timeouts_are_unavailable() {
        let err = ErrorKind::database(sqlx::Error::PoolTimedOut);
        assert!(matches!(&*err, ErrorKind::Unavailable));
        let err = ErrorKind::database(sqlx::Error::RowNotFound);
        assert!(matches!(&*err, ErrorKind::Database));
    }
}
