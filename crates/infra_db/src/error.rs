//! Database error types
//!
//! Errors raised by the repositories, and their translation to the
//! [`PortError`] the domain sees.

use thiserror::Error;

use core_kernel::PortError;

/// Errors that can occur during database operations
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to establish a database connection
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Entity not found in database
    #[error("Entity not found: {0}")]
    NotFound(String),

    /// Unique constraint violation
    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    /// Foreign key constraint violation
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// Check constraint violation, e.g. a negative `balance_after`
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Could not serialize against a concurrent transaction
    #[error("Serialization failure: {0}")]
    SerializationFailure(String),

    /// Migration error
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// A stored value could not be mapped to a domain type
    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    /// Pool exhaustion - no available connections
    #[error("Connection pool exhausted")]
    PoolExhausted,
}

impl DatabaseError {
    /// Creates a not found error for a specific entity type and identifier
    ///
    /// # Example
    ///
    /// ```rust
    /// use infra_db::DatabaseError;
    ///
    /// let error = DatabaseError::not_found("Transfer", "TRF-123");
    /// assert!(error.to_string().contains("Transfer"));
    /// ```
    pub fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        DatabaseError::NotFound(format!("{} with id '{}' not found", entity, id))
    }

    /// Checks if this error indicates a record was not found
    pub fn is_not_found(&self) -> bool {
        matches!(self, DatabaseError::NotFound(_))
    }

    /// Checks if this error is a constraint violation
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            DatabaseError::DuplicateEntry(_)
                | DatabaseError::ForeignKeyViolation(_)
                | DatabaseError::ConstraintViolation(_)
        )
    }

    /// Checks if this error is a connection-related issue
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            DatabaseError::ConnectionFailed(_) | DatabaseError::PoolExhausted
        )
    }
}

/// Maps SQLx errors to specific variants using the PostgreSQL error code
///
/// <https://www.postgresql.org/docs/current/errcodes-appendix.html>
impl From<sqlx::Error> for DatabaseError {
    fn from(error: sqlx::Error) -> Self {
        match &error {
            sqlx::Error::RowNotFound => DatabaseError::NotFound("Record not found".to_string()),
            sqlx::Error::PoolTimedOut => DatabaseError::PoolExhausted,
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolClosed => {
                DatabaseError::ConnectionFailed(error.to_string())
            }
            sqlx::Error::Database(db_err) => {
                let message = db_err.message().to_string();
                match db_err.code().as_deref() {
                    Some("23505") => DatabaseError::DuplicateEntry(message),
                    Some("23503") => DatabaseError::ForeignKeyViolation(message),
                    Some("23514") => DatabaseError::ConstraintViolation(message),
                    Some("40001") | Some("40P01") => DatabaseError::SerializationFailure(message),
                    _ => DatabaseError::QueryFailed(message),
                }
            }
            _ => DatabaseError::QueryFailed(error.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DatabaseError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        DatabaseError::MigrationFailed(error.to_string())
    }
}

/// Converts repository errors to port errors
///
/// Connection problems and serialization failures stay transient so callers
/// can retry them.
pub fn db_to_port_error(e: DatabaseError) -> PortError {
    match e {
        DatabaseError::NotFound(msg) => PortError::NotFound {
            entity_type: "row".to_string(),
            id: msg,
        },
        DatabaseError::DuplicateEntry(msg) => PortError::conflict(msg),
        DatabaseError::ConnectionFailed(_) | DatabaseError::PoolExhausted => PortError::Connection {
            message: e.to_string(),
            source: Some(Box::new(e)),
        },
        DatabaseError::SerializationFailure(msg) => PortError::ServiceUnavailable {
            service: format!("postgres ({})", msg),
        },
        DatabaseError::CorruptRow(msg) => PortError::transformation(msg),
        other => PortError::Internal {
            message: other.to_string(),
            source: Some(Box::new(other)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        let error = DatabaseError::not_found("Account", "ACC-1");
        assert!(error.is_not_found());
        assert!(error.to_string().contains("ACC-1"));
    }

    #[test]
    fn test_classification() {
        assert!(DatabaseError::ConstraintViolation("balance".into()).is_constraint_violation());
        assert!(DatabaseError::PoolExhausted.is_connection_error());
        assert!(!DatabaseError::QueryFailed("x".into()).is_connection_error());
    }

    #[test]
    fn test_port_error_mapping_keeps_transience() {
        assert!(db_to_port_error(DatabaseError::PoolExhausted).is_transient());
        assert!(db_to_port_error(DatabaseError::SerializationFailure("retry".into())).is_transient());
        assert!(!db_to_port_error(DatabaseError::ConstraintViolation("check".into())).is_transient());
        assert!(matches!(
            db_to_port_error(DatabaseError::DuplicateEntry("key".into())),
            PortError::Conflict { .. }
        ));
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let error: DatabaseError = sqlx::Error::RowNotFound.into();
        assert!(error.is_not_found());
    }
}
