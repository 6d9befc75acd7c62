use thiserror::Error;
use uuid::Uuid;

/// Failures raised by a `SessionStore` or one of its transactions.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Uniqueness, referential or check constraint rejected the write.
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Session {0} not found")]
    NotFound(Uuid),

    /// Connectivity or transport failure against the persistence layer.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(ref db_err)
                if db_err.is_unique_violation()
                    || db_err.is_foreign_key_violation()
                    || db_err.is_check_violation() =>
            {
                StoreError::ConstraintViolation(db_err.message().to_string())
            }
            // 23502 not_null_violation, 22001 string_data_right_truncation
            sqlx::Error::Database(ref db_err)
                if matches!(db_err.code().as_deref(), Some("23502") | Some("22001")) =>
            {
                StoreError::ConstraintViolation(db_err.message().to_string())
            }
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StoreError::Unavailable(err.to_string()),
            other => StoreError::Database(other),
        }
    }
}

/// Errors surfaced by the ingestion and retrieval services to the boundary.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Payload failed field-level validation; nothing was written.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No such session: {0}")]
    NotFound(Uuid),

    #[error("Storage unavailable")]
    StorageUnavailable,

    /// The ingestion transaction was rolled back. The storage cause is logged, not carried.
    #[error("Failed to persist session")]
    IngestionFailed,

    #[error("Storage error: {0}")]
    Storage(StoreError),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => ServiceError::NotFound(id),
            StoreError::Unavailable(_) => ServiceError::StorageUnavailable,
            other => ServiceError::Storage(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_timeout_is_unavailable() {
        let err = StoreError::from(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    #[test]
    fn test_row_not_found_is_generic_database_error() {
        let err = StoreError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, StoreError::Database(_)));
    }

    #[test]
    fn test_not_found_stays_distinct_from_unavailable() {
        let id = Uuid::new_v4();
        assert!(matches!(
            ServiceError::from(StoreError::NotFound(id)),
            ServiceError::NotFound(got) if got == id
        ));
        assert!(matches!(
            ServiceError::from(StoreError::Unavailable("down".into())),
            ServiceError::StorageUnavailable
        ));
    }

    #[test]
    fn test_ingestion_failed_hides_storage_text() {
        let msg = ServiceError::IngestionFailed.to_string();
        assert_eq!(msg, "Failed to persist session");
    }
}
