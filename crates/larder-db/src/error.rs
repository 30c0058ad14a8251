//! # Database Error Types
//!
//! ## Where Errors Come From
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  sqlx::Error::Database(message)                                        │
//! │    "CROSS_STORE_VIOLATION: ..."   → CrossStoreViolation  (trigger)      │
//! │    "APPEND_ONLY: ..."             → AppendOnlyViolation  (trigger)      │
//! │    "UNIQUE constraint failed: t.c"→ UniqueViolation { field: "t.c" }    │
//! │    "FOREIGN KEY constraint ..."   → ForeignKeyViolation                 │
//! │    "CHECK constraint failed: ..." → ConstraintViolation (stock < 0)     │
//! │    anything else                  → QueryFailed                         │
//! │                                                                         │
//! │  sqlx::Error::PoolTimedOut        → PoolExhausted                       │
//! │  sqlx::Error::PoolClosed          → ConnectionFailed                    │
//! │  MigrateError                     → MigrationFailed                     │
//! │                                                                         │
//! │  The engine adapter keeps CrossStoreViolation distinct and folds the   │
//! │  rest into CoreError::StorageFailure.                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use larder_core::ValidationError;
use thiserror::Error;

/// Message prefix raised by the cross-store triggers.
pub const CROSS_STORE_PREFIX: &str = "CROSS_STORE_VIOLATION";

/// Message prefix raised by the append-only triggers.
pub const APPEND_ONLY_PREFIX: &str = "APPEND_ONLY";

/// Storage errors of the ledger, catalog and outcome log.
#[derive(Debug, Error)]
pub enum DbError {
    /// Row does not exist, or is not in the store that asked for it.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Same item name twice in one store
    /// - Second committed outcome with the same idempotency key
    #[error("Duplicate {field}")]
    UniqueViolation { field: String },

    /// Foreign key constraint violation.
    ///
    /// ## When This Occurs
    /// - Movement for an inventory item that does not exist
    /// - Product pointing at a template that does not exist
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    /// The storage-level cross-store guard rejected a write.
    ///
    /// ## When This Occurs
    /// - A movement's store differs from its item's store
    /// - An update tried to move an item to another store
    #[error("Cross-store violation: {0}")]
    CrossStoreViolation(String),

    /// Attempt to modify or delete an inventory movement.
    #[error("Append-only violation: {0}")]
    AppendOnlyViolation(String),

    /// CHECK constraint failure, e.g. stock going negative.
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Data rejected before it reached SQL.
    #[error("Invalid data: {0}")]
    Invalid(#[from] ValidationError),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Every connection stayed busy past the acquire timeout.
    #[error("Connection pool exhausted")]
    PoolExhausted,

    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Maps a SQLite error message, including trigger `RAISE` texts.
    pub fn from_sqlite_message(message: &str) -> Self {
        if message.starts_with(CROSS_STORE_PREFIX) {
            return DbError::CrossStoreViolation(message.to_string());
        }
        if message.starts_with(APPEND_ONLY_PREFIX) {
            return DbError::AppendOnlyViolation(message.to_string());
        }
        if let Some(field) = message.strip_prefix("UNIQUE constraint failed: ") {
            return DbError::UniqueViolation {
                field: field.to_string(),
            };
        }
        if message.contains("FOREIGN KEY constraint failed") {
            return DbError::ForeignKeyViolation(message.to_string());
        }
        if message.contains("CHECK constraint failed") {
            return DbError::ConstraintViolation(message.to_string());
        }
        DbError::QueryFailed(message.to_string())
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Record", "unknown"),
            sqlx::Error::Database(db_err) => DbError::from_sqlite_message(db_err.message()),
            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,
            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),
            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;
