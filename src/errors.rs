use sea_orm::error::{ConnAcquireErr, DbErr};
use serde::Serialize;

/// Error type shared by every ledger service.
///
/// Validation and availability failures are rejected before any write.
/// `ConcurrencyTimeout` is the only transient variant; callers may retry the
/// whole operation. `DataIntegrity` means a ledger invariant was observed
/// broken and must be resolved by an operator or the reconciliation job.
#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[serde(skip)]
        DbErr,
    ),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    #[error("Concurrency timeout: {0}")]
    ConcurrencyTimeout(String),

    #[error("Data integrity violation: {0}")]
    DataIntegrity(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<DbErr> for ServiceError {
    fn from(err: DbErr) -> Self {
        ServiceError::db_error(err)
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::InvalidInput(err.to_string())
    }
}

/// Backend messages that indicate a lock wait was abandoned.
const LOCK_TIMEOUT_MARKERS: [&str; 4] = [
    "lock timeout",
    "could not obtain lock",
    "database is locked",
    "lock wait timeout",
];

impl ServiceError {
    /// Classifies lock waits and pool exhaustion as `ConcurrencyTimeout`.
    pub fn db_error(err: DbErr) -> Self {
        if matches!(err, DbErr::ConnectionAcquire(ConnAcquireErr::Timeout)) {
            return ServiceError::ConcurrencyTimeout(
                "timed out acquiring a database connection".to_string(),
            );
        }

        let message = err.to_string().to_lowercase();
        if LOCK_TIMEOUT_MARKERS.iter().any(|m| message.contains(m)) {
            return ServiceError::ConcurrencyTimeout(err.to_string());
        }

        ServiceError::DatabaseError(err)
    }

    pub fn insufficient_stock(
        item_id: i64,
        location: impl std::fmt::Display,
        requested: rust_decimal::Decimal,
        available: rust_decimal::Decimal,
    ) -> Self {
        ServiceError::InsufficientStock(format!(
            "item {} at {}: requested {}, only {} available",
            item_id, location, requested, available
        ))
    }

    /// Only lock contention is worth retrying; everything else fails the same
    /// way on the next attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::ConcurrencyTimeout(_))
    }

    /// Stable machine-readable code for callers that surface ledger errors.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DatabaseError(_) => "database_error",
            Self::InvalidInput(_) => "invalid_input",
            Self::NotFound(_) => "not_found",
            Self::InsufficientStock(_) => "insufficient_stock",
            Self::ConcurrencyTimeout(_) => "concurrency_timeout",
            Self::DataIntegrity(_) => "data_integrity",
            Self::InternalError(_) => "internal_error",
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
