//! # Engine Error Types
//!
//! Error types for the engine's ambient operations: configuration, startup
//! and the monitor loop.
//!
//! Sale lines never surface these. `apply_deduction` and
//! `check_availability` report business failures inside their result objects
//! using [`CoreError`] messages.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Engine Error Categories                            │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │    Storage      │  │       Domain            │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Database       │  │  Core (CoreError)       │ │
//! │  │  ConfigLoad     │  │  (DbError)      │  │                         │ │
//! │  │  ConfigSave     │  │                 │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐                                                   │
//! │  │    Runtime      │                                                   │
//! │  │                 │                                                   │
//! │  │  ChannelError   │                                                   │
//! │  └─────────────────┘                                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use larder_core::CoreError;
use larder_db::DbError;
use thiserror::Error;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine error type.
#[derive(Debug, Error)]
pub enum EngineError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid engine configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Storage Errors
    // =========================================================================
    /// Database layer failure.
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    // =========================================================================
    // Domain Errors
    // =========================================================================
    /// Deduction domain failure.
    #[error(transparent)]
    Core(#[from] CoreError),

    // =========================================================================
    // Runtime Errors
    // =========================================================================
    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        EngineError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for EngineError {
    fn from(err: toml::ser::Error) -> Self {
        EngineError::ConfigSaveFailed(err.to_string())
    }
}

impl EngineError {
    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidConfig(_)
                | EngineError::ConfigLoadFailed(_)
                | EngineError::ConfigSaveFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_errors() {
        assert!(EngineError::InvalidConfig("zero attempts".into()).is_config_error());
        assert!(EngineError::from(std::io::Error::other("denied")).is_config_error());
        assert!(!EngineError::ChannelError("closed".into()).is_config_error());
    }

    #[test]
    fn test_core_errors_display_unchanged() {
        let err = EngineError::from(CoreError::UnknownProduct("mini-croffle".into()));
        assert_eq!(
            err.to_string(),
            CoreError::UnknownProduct("mini-croffle".into()).to_string()
        );
    }

    #[test]
    fn test_database_error_wrapped() {
        let err = EngineError::from(DbError::PoolExhausted);
        assert!(err.to_string().contains("Connection pool exhausted"));
    }
}
