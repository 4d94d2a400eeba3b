//! Error types for the graph store.

use thiserror::Error;

/// Errors that can occur in the graph store.
#[derive(Debug, Error)]
pub enum GraphError {
    /// An operation was attempted before `connect` or after `teardown`.
    #[error("store not initialized - call connect() first")]
    NotInitialized,

    /// A required configuration value was absent at connect time.
    #[error("missing configuration: {0}")]
    MissingConfig(String),

    /// A referenced entity does not exist.
    #[error("Entity with name {0} not found")]
    NotFound(String),

    /// A UNIQUE or PRIMARY KEY constraint rejected a write.
    ///
    /// The graph operations intercept this and turn it into a silent skip.
    #[error("constraint conflict: {0}")]
    ConstraintConflict(String),

    /// Input rejected before any statement ran.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Local SQLite failure.
    #[error("database error: {0}")]
    Database(#[source] rusqlite::Error),

    /// The remote server rejected a statement.
    #[error("remote error{}: {message}", code_suffix(.code))]
    Remote {
        /// SQLite-style error code reported by the server, if any.
        code: Option<String>,
        /// Error message from the server.
        message: String,
    },

    /// HTTP transport failure talking to the remote server.
    #[error("transport error: {0}")]
    Transport(String),

    /// The remote server answered with something we did not expect.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The configured store address could not be understood.
    #[error("invalid database URL: {0}")]
    InvalidUrl(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Replica synchronization failed after the local write landed.
    #[error("replica sync failed: {0}")]
    SyncFailure(#[source] Box<GraphError>),
}

/// Result type alias for graph store operations.
pub type Result<T> = std::result::Result<T, GraphError>;

impl GraphError {
    /// Create a transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a protocol error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Wrap an error as a sync failure.
    pub fn sync_failure(err: GraphError) -> Self {
        match err {
            // Already wrapped, keep a single layer.
            Self::SyncFailure(_) => err,
            other => Self::SyncFailure(Box::new(other)),
        }
    }

    /// Whether this is a UNIQUE/PRIMARY KEY conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ConstraintConflict(_))
    }

    /// Whether this is an underlying I/O, protocol or storage failure.
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            Self::Database(_)
                | Self::Remote { .. }
                | Self::Transport(_)
                | Self::Protocol(_)
                | Self::InvalidUrl(_)
                | Self::Serialization(_)
        )
    }

    /// Stable name of the error kind, for machine-readable reporting.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotInitialized => "NotInitialized",
            Self::MissingConfig(_) => "MissingConfig",
            Self::NotFound(_) => "NotFound",
            Self::ConstraintConflict(_) => "ConstraintConflict",
            Self::InvalidData(_) => "InvalidData",
            Self::SyncFailure(_) => "SyncFailure",
            _ => "StorageFailure",
        }
    }
}

impl From<rusqlite::Error> for GraphError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, msg)
                if is_unique_violation(code.extended_code) =>
            {
                Self::ConstraintConflict(
                    msg.clone()
                        .unwrap_or_else(|| "UNIQUE constraint failed".to_string()),
                )
            }
            _ => Self::Database(err),
        }
    }
}

fn code_suffix(code: &Option<String>) -> String {
    code.as_deref()
        .map(|c| format!(" [{c}]"))
        .unwrap_or_default()
}

/// Extended result codes for UNIQUE and PRIMARY KEY violations.
fn is_unique_violation(extended_code: i32) -> bool {
    extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
        || extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
}

/// Extended codes for UNIQUE and PRIMARY KEY violations.
///
/// libSQL servers often report only the primary `SQLITE_CONSTRAINT`, which
/// stays a [`GraphError::Remote`].
pub(crate) fn is_unique_violation_code(code: &str) -> bool {
    matches!(
        code,
        "SQLITE_CONSTRAINT_UNIQUE" | "SQLITE_CONSTRAINT_PRIMARYKEY"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite_failure(extended_code: i32) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(extended_code),
            Some("constraint failed".to_string()),
        )
    }

    #[test]
    fn test_unique_violation_maps_to_conflict() {
        let err: GraphError = sqlite_failure(rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE).into();
        assert!(err.is_conflict());

        let err: GraphError = sqlite_failure(rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY).into();
        assert!(err.is_conflict());
    }

    #[test]
    fn test_other_constraints_are_storage_failures() {
        let err: GraphError = sqlite_failure(rusqlite::ffi::SQLITE_CONSTRAINT_NOTNULL).into();
        assert!(!err.is_conflict());
        assert!(err.is_storage_failure());
        assert_eq!(err.kind(), "StorageFailure");
    }

    #[test]
    fn test_remote_codes() {
        assert!(is_unique_violation_code("SQLITE_CONSTRAINT_UNIQUE"));
        assert!(is_unique_violation_code("SQLITE_CONSTRAINT_PRIMARYKEY"));
        assert!(!is_unique_violation_code("SQLITE_CONSTRAINT_FOREIGNKEY"));
    }

    #[test]
    fn test_sync_failure_wraps_once() {
        let err = GraphError::sync_failure(GraphError::transport("connection refused"));
        let err = GraphError::sync_failure(err);
        match err {
            GraphError::SyncFailure(inner) => {
                assert!(matches!(*inner, GraphError::Transport(_)))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_error_display() {
        let err = GraphError::NotFound("Alice".to_string());
        assert_eq!(err.to_string(), "Entity with name Alice not found");

        let err = GraphError::Remote {
            code: Some("SQLITE_ERROR".to_string()),
            message: "no such table".to_string(),
        };
        assert!(err.to_string().contains("[SQLITE_ERROR]"));
        assert!(err.to_string().contains("no such table"));
    }
}
