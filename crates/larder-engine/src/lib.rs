//! # larder-engine: Deduction Engine for Larder
//!
//! Orchestrates the three operations the POS layer calls, on top of the pure
//! rules in `larder-core` and the SQLite ledger in `larder-db`.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         larder-engine                                   │
//! │                                                                         │
//! │  POS checkout                    Back office                            │
//! │      │                               │                                  │
//! │      ├─► AvailabilityChecker         ├─► HealthMonitor::check_health    │
//! │      │     check_availability        │     stock_report, run (timer)    │
//! │      │                               │                                  │
//! │      └─► DeductionEngine             └─► DeductionEngine                │
//! │            apply_deduction                 reverse_transaction          │
//! │                   │                                                     │
//! │                   ▼                                                     │
//! │   ┌────────────────────────────────────────────────────────────────┐   │
//! │   │  RecipeSource      InventoryLedger        OutcomeLog           │   │
//! │   │  (traits, injected as Arc<dyn ...>)                            │   │
//! │   └───────────────────────────────┬────────────────────────────────┘   │
//! │                                   ▼                                     │
//! │                    larder_db::Database (store.rs)                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`availability`] - Pre-flight "can we make N of these?" check
//! - [`deduction`] - All-or-nothing application with compensating rollback
//! - [`monitor`] - False-success and cross-store leak detection
//! - [`traits`] - Collaborator interfaces
//! - [`store`] - SQLite implementation of the collaborators
//! - [`config`] - TOML + environment configuration
//! - [`error`] - Engine error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use larder_db::{Database, DbConfig};
//! use larder_engine::{DeductionEngine, DeductionSettings};
//!
//! let db = Database::new(DbConfig::new("./larder.db")).await?;
//! let engine = DeductionEngine::from_database(db, DeductionSettings::default());
//!
//! let result = engine.apply_deduction(&sale_line).await;
//! if !result.success {
//!     // name result.failed_ingredients to the cashier
//! }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod availability;
pub mod config;
pub mod deduction;
pub mod error;
pub mod monitor;
pub mod store;
pub mod traits;

mod resolve;

#[cfg(test)]
mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use availability::AvailabilityChecker;
pub use config::{DatabaseSettings, DeductionSettings, LarderConfig, MonitorSettings};
pub use deduction::DeductionEngine;
pub use error::{EngineError, EngineResult};
pub use monitor::{HealthMonitor, MonitorHandle, RaisedAlerts};
pub use traits::{InventoryLedger, OutcomeLog, RecipeSource};
