//! # larder-core: Pure Deduction Logic for Larder
//!
//! This crate holds the business rules of recipe-driven inventory deduction
//! as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Larder Architecture                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │          POS checkout, admin repair, health dashboards          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    larder-engine                                │   │
//! │  │    check_availability, apply_deduction, check_health            │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ larder-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │ quantity  │  │  recipe   │  │   guard   │  │   │
//! │  │   │ SaleLine  │  │ Quantity  │  │ expansion │  │ authorize │  │   │
//! │  │   │ Movement  │  │ Portions  │  │ max sell  │  │           │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    larder-db (Database Layer)                   │   │
//! │  │          SQLite ledger, recipe catalog, outcome log             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (InventoryItem, RecipeTemplate, SaleLine, etc.)
//! - [`quantity`] - Fixed-point quantity in thousandths (no floating point!)
//! - [`recipe`] - Requirement expansion and max-sellable arithmetic
//! - [`guard`] - Cross-store guard predicate
//! - [`error`] - Domain error types
//! - [`validation`] - Sale line and recipe validation
//!
//! ## Example Usage
//!
//! ```rust
//! use larder_core::quantity::Quantity;
//! use larder_core::types::PortionMultiplier;
//!
//! // Quantities are exact decimals, never floats
//! let topping: Quantity = "1".parse().unwrap();
//!
//! // A "mini" variant takes half a portion
//! let mini = topping.apply_portion(PortionMultiplier::HALF).unwrap();
//! assert_eq!(mini.to_string(), "0.5");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod guard;
pub mod quantity;
pub mod recipe;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use quantity::Quantity;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum quantity of a single product on one sale line.
///
/// ## Business Reason
/// Prevents accidental over-ordering (e.g., typing 1000 instead of 10).
/// Also caps the max-sellable figure reported by availability checks.
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Default number of conditional-update attempts per pair before a sale
/// line gives up and rolls back.
pub const DEFAULT_MAX_APPLY_ATTEMPTS: u32 = 3;
