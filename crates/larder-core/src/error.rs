//! # Error Types
//!
//! Domain-specific error types for larder-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  larder-core errors (this file)                                        │
//! │  ├── CoreError        - Deduction domain errors                        │
//! │  └── ValidationError  - Input and recipe validation failures           │
//! │                                                                         │
//! │  larder-db errors (separate crate)                                     │
//! │  └── DbError          - Storage failures, trigger rejections           │
//! │                                                                         │
//! │  larder-engine errors (separate crate)                                 │
//! │  └── EngineError      - Config, channel, wrapped Db/Core errors        │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DeductionResult.errors → POS UI   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Name the ingredient at fault so the cashier can act on it
//! 3. Errors are enum variants, never String
//! 4. Cross-store violations are their own class, never "insufficient stock"

use thiserror::Error;

use crate::quantity::Quantity;

// =============================================================================
// Core Error
// =============================================================================

/// Deduction domain errors.
///
/// The phase an error is raised in decides what happens to the ledger:
///
/// ```text
/// ┌──────────────┬──────────────────────────────────┬───────────────────────┐
/// │ Phase        │ Errors                           │ Ledger effect         │
/// ├──────────────┼──────────────────────────────────┼───────────────────────┤
/// │ RESOLVING    │ UnknownProduct, UnknownRecipe,   │ untouched             │
/// │              │ UnknownChoice, MissingIngredient,│                       │
/// │              │ AmbiguousIngredient, Validation  │                       │
/// │ VALIDATING   │ InsufficientStock,               │ untouched             │
/// │              │ CrossStoreViolation              │                       │
/// │ APPLYING     │ InsufficientStock (lost race),   │ applied pairs are     │
/// │              │ ConcurrentUpdateConflict,        │ rolled back           │
/// │              │ StorageFailure                   │                       │
/// └──────────────┴──────────────────────────────────┴───────────────────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Product id does not exist in the catalog.
    #[error("Product not found: {0}")]
    UnknownProduct(String),

    /// Product has no recipe, or its template id does not resolve.
    ///
    /// ## When This Occurs
    /// - Product was created without attaching a recipe template
    /// - Template was removed after the product was configured
    #[error("Recipe not found: {0}")]
    UnknownRecipe(String),

    /// A selected choice id is not a choice requirement of the template.
    #[error("Choice {choice_id} is not an optional ingredient of recipe {template_id}")]
    UnknownChoice {
        choice_id: String,
        template_id: String,
    },

    /// No active inventory item in the store matches the ingredient name.
    #[error("Ingredient '{ingredient}' is not stocked in store {store_id}")]
    MissingIngredient { ingredient: String, store_id: String },

    /// More than one active inventory item in the store matches the name.
    ///
    /// ## When This Occurs
    /// - Two items differ only by case or spacing ("Choco Flakes" vs "choco  flakes")
    #[error("Ingredient '{ingredient}' matches {matches} items in store {store_id}")]
    AmbiguousIngredient {
        ingredient: String,
        store_id: String,
        matches: usize,
    },

    /// Not enough stock to cover the deduction.
    ///
    /// ## User Workflow
    /// ```text
    /// Sell 1 Mini Croffle + Choco Flakes
    ///      │
    ///      ▼
    /// Fresh read: Choco Flakes = 0.3, needed = 0.5
    ///      │
    ///      ▼
    /// InsufficientStock { item: "Choco Flakes", needed: 0.5, available: 0.3 }
    ///      │
    ///      ▼
    /// Cashier substitutes the topping or cancels the item
    /// ```
    #[error("Insufficient stock for {item}: needed {needed}, available {available}")]
    InsufficientStock {
        item: String,
        needed: Quantity,
        available: Quantity,
    },

    /// An inventory item from another store was about to be touched.
    ///
    /// Signals a data-integrity bug. Never retried.
    #[error("Cross-store violation on {item}: sale is for store {expected_store} but item belongs to store {actual_store}")]
    CrossStoreViolation {
        item: String,
        expected_store: String,
        actual_store: String,
    },

    /// The optimistic update kept losing to concurrent writers.
    #[error("Could not secure {item} after {attempts} attempts due to concurrent updates")]
    ConcurrentUpdateConflict { item: String, attempts: u32 },

    /// I/O-level failure from the ledger or catalog.
    #[error("Storage failure: {0}")]
    StorageFailure(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// The ingredient this error is about, if it names one.
    ///
    /// Used to build the `failed_ingredients` list handed to the cashier.
    pub fn ingredient(&self) -> Option<&str> {
        match self {
            CoreError::MissingIngredient { ingredient, .. }
            | CoreError::AmbiguousIngredient { ingredient, .. } => Some(ingredient),
            CoreError::InsufficientStock { item, .. }
            | CoreError::CrossStoreViolation { item, .. }
            | CoreError::ConcurrentUpdateConflict { item, .. } => Some(item),
            _ => None,
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised for malformed sale lines and for recipe templates that break the
/// requirement invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., bad decimal text).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Duplicate value (e.g., two requirements with the same id).
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },

    /// A recipe requirement breaks a structural rule.
    #[error("Requirement '{requirement}' is invalid: {reason}")]
    InvalidRequirement { requirement: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
