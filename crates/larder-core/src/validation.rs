//! # Validation Module
//!
//! Input validation for sale lines and recipe templates.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: POS checkout (excluded UI)                                   │
//! │  └── Quantity spinner, choice pickers                                  │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── validate_sale_line before RESOLVING                               │
//! │  └── validate_template before a recipe is stored                       │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK (stock_quantity >= 0)                                       │
//! │  ├── UNIQUE (store_id, item_name)                                      │
//! │  └── Cross-store and append-only triggers                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust,no_run
//! use larder_core::validation::{validate_quantity_sold, validate_item_name};
//!
//! validate_item_name("Croissant").unwrap();
//! validate_quantity_sold(2).unwrap();
//! ```

use std::collections::HashSet;

use crate::error::ValidationError;
use crate::quantity::Quantity;
use crate::types::{IngredientRequirement, IngredientRole, RecipeTemplate, SaleLine};
use crate::MAX_ITEM_QUANTITY;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Maximum length of names and identifiers.
const MAX_NAME_LEN: usize = 200;

// =============================================================================
// String Validators
// =============================================================================

fn validate_required(field: &str, value: &str) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.len() > MAX_NAME_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_NAME_LEN,
        });
    }

    Ok(())
}

/// Validates an inventory item or ingredient name.
///
/// ## Example
/// ```rust
/// use larder_core::validation::validate_item_name;
///
/// assert!(validate_item_name("Whipped Cream").is_ok());
/// assert!(validate_item_name("   ").is_err());
/// ```
pub fn validate_item_name(name: &str) -> ValidationResult<()> {
    validate_required("item_name", name)
}

/// Validates a store identifier.
pub fn validate_store_id(store_id: &str) -> ValidationResult<()> {
    validate_required("store_id", store_id)
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates the number of units sold on a line.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY (999)
pub fn validate_quantity_sold(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity_sold".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity_sold".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a stock level. Zero is allowed, negative is not.
///
/// ## Example
/// ```rust
/// use larder_core::quantity::Quantity;
/// use larder_core::validation::validate_stock_quantity;
///
/// assert!(validate_stock_quantity(Quantity::zero()).is_ok());
/// assert!(validate_stock_quantity(Quantity::from_thousandths(-1)).is_err());
/// ```
pub fn validate_stock_quantity(qty: Quantity) -> ValidationResult<()> {
    if qty.is_negative() {
        return Err(ValidationError::OutOfRange {
            field: "stock_quantity".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

// =============================================================================
// Sale Line
// =============================================================================

/// Validates a sale line before it enters the engine.
pub fn validate_sale_line(line: &SaleLine) -> ValidationResult<()> {
    validate_required("product_id", &line.product_id)?;
    validate_store_id(&line.store_id)?;
    validate_required("transaction_id", &line.transaction_id)?;
    validate_quantity_sold(line.quantity_sold)?;

    if let Some(key) = &line.idempotency_key {
        validate_required("idempotency_key", key)?;
    }

    Ok(())
}

// =============================================================================
// Recipe Templates
// =============================================================================

/// Validates one requirement.
///
/// ## Rules
/// - `base_quantity` is positive
/// - `portion_multiplier` is not zero
/// - `base_quantity * portion_multiplier` is a whole thousandth
/// - choice requirements have a `choice_group`, base requirements do not
pub fn validate_requirement(req: &IngredientRequirement) -> ValidationResult<()> {
    validate_required("requirement id", &req.id)?;
    validate_item_name(&req.ingredient_name)?;

    let invalid = |reason: &str| ValidationError::InvalidRequirement {
        requirement: req.ingredient_name.clone(),
        reason: reason.to_string(),
    };

    if !req.base_quantity.is_positive() {
        return Err(invalid("base quantity must be positive"));
    }
    if req.portion_multiplier.is_zero() {
        return Err(invalid("portion multiplier must be positive"));
    }
    if req.per_unit_quantity().is_none() {
        return Err(invalid("portion does not land on a whole thousandth"));
    }

    let has_group = req
        .choice_group
        .as_deref()
        .map(|g| !g.trim().is_empty())
        .unwrap_or(false);

    match (req.role, has_group) {
        (IngredientRole::Choice, false) => Err(invalid("choice requirements need a choice group")),
        (IngredientRole::Base, true) => Err(invalid("base requirements cannot have a choice group")),
        _ => Ok(()),
    }
}

/// Validates a whole template.
///
/// Requirement ids must be unique within the template so that a selected
/// choice id identifies exactly one line.
pub fn validate_template(template: &RecipeTemplate) -> ValidationResult<()> {
    validate_required("template id", &template.id)?;
    validate_required("template name", &template.name)?;

    let mut seen = HashSet::new();
    for req in &template.ingredients {
        validate_requirement(req)?;
        if !seen.insert(req.id.as_str()) {
            return Err(ValidationError::Duplicate {
                field: "requirement id".to_string(),
                value: req.id.clone(),
            });
        }
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
