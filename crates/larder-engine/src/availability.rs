//! # Availability Checker
//!
//! Pre-flight answer to "can this store make N of this product right now?".
//!
//! ```text
//! check_availability("mini-croffle", 2, ["choco"], "store-a")
//!      │
//!      ├── resolve template, expand selection, match store items
//!      │
//!      ├── Croissant       10   needs 1     ok
//!      ├── Whipped Cream   10   needs 1     ok
//!      ├── Popsicle Stick  10   needs 2     ok
//!      └── Choco Flakes    0.3  needs 1     short
//!      │
//!      ▼
//! { can_make: false, max_quantity: 0, missing_ingredients: ["Choco Flakes"] }
//! ```
//!
//! The checker reads stock once and never writes. Its answer can be stale
//! by the time the sale is applied; the deduction engine reads again.

use std::sync::Arc;

use tracing::{debug, instrument};

use larder_core::recipe::max_sellable;
use larder_core::validation::validate_quantity_sold;
use larder_core::{AvailabilityResult, CoreError, IngredientShortfall, Quantity};
use larder_db::Database;

use crate::resolve::{load_template, resolve_demands};
use crate::traits::{InventoryLedger, RecipeSource};

/// Computes sellable quantities against current stock.
#[derive(Clone)]
pub struct AvailabilityChecker {
    recipes: Arc<dyn RecipeSource>,
    ledger: Arc<dyn InventoryLedger>,
}

impl AvailabilityChecker {
    pub fn new(recipes: Arc<dyn RecipeSource>, ledger: Arc<dyn InventoryLedger>) -> Self {
        AvailabilityChecker { recipes, ledger }
    }

    /// Checker backed by a SQLite database.
    pub fn from_database(db: Database) -> Self {
        let db = Arc::new(db);
        AvailabilityChecker::new(db.clone(), db)
    }

    /// Checks whether `quantity` units can be made in `store_id`.
    ///
    /// Never fails: unknown products, recipe problems and storage errors all
    /// come back as `can_make = false` with the cause in `errors`.
    ///
    /// ## Returns
    /// - `max_quantity`: largest quantity every requirement could cover,
    ///   `0` when any ingredient is not stocked
    /// - `missing_ingredients`: ingredients that are not stocked or cannot
    ///   cover `quantity`; for an unknown product or recipe, a single entry
    ///   naming it
    #[instrument(skip(self, selected_choice_ids), fields(product_id = %product_id, store_id = %store_id))]
    pub async fn check_availability(
        &self,
        product_id: &str,
        quantity: i64,
        selected_choice_ids: &[String],
        store_id: &str,
    ) -> AvailabilityResult {
        let template = match load_template(self.recipes.as_ref(), product_id).await {
            Ok(template) => template,
            Err(e) => {
                let missing = match &e {
                    CoreError::UnknownRecipe(name) => name.clone(),
                    _ => product_id.to_string(),
                };
                debug!(error = %e, "Product cannot be resolved");
                return AvailabilityResult::unavailable(missing, e.to_string());
            }
        };

        let (demands, unresolved) = match resolve_demands(
            self.ledger.as_ref(),
            &template,
            selected_choice_ids,
            store_id,
        )
        .await
        {
            Ok(resolved) => resolved,
            Err(e) => {
                let missing = match &e {
                    CoreError::UnknownChoice { choice_id, .. } => choice_id.clone(),
                    _ => template.id.clone(),
                };
                debug!(error = %e, "Recipe cannot be expanded");
                return AvailabilityResult::unavailable(missing, e.to_string());
            }
        };

        let mut result = AvailabilityResult {
            can_make: false,
            max_quantity: 0,
            missing_ingredients: Vec::new(),
            shortfalls: Vec::new(),
            errors: Vec::new(),
        };

        if let Err(e) = validate_quantity_sold(quantity) {
            result.errors.push(e.to_string());
        }

        for entry in &unresolved {
            result
                .missing_ingredients
                .push(entry.line.ingredient_name.clone());
            result.errors.push(entry.error.to_string());
            result.shortfalls.push(IngredientShortfall {
                ingredient_name: entry.line.ingredient_name.clone(),
                inventory_item_id: None,
                needed: entry
                    .line
                    .per_unit
                    .checked_mul_units(quantity.max(0))
                    .unwrap_or(entry.line.per_unit),
                available: Quantity::zero(),
            });
        }

        for demand in &demands {
            let available = demand.item.stock_quantity;
            let needed = demand.per_unit.checked_mul_units(quantity.max(0));
            let covered = matches!(needed, Some(needed) if available >= needed);
            if !covered {
                result.missing_ingredients.push(demand.item.item_name.clone());
                result.shortfalls.push(IngredientShortfall {
                    ingredient_name: demand.item.item_name.clone(),
                    inventory_item_id: Some(demand.item.id.clone()),
                    needed: needed.unwrap_or(demand.per_unit),
                    available,
                });
            }
        }

        result.max_quantity = if unresolved.is_empty() {
            max_sellable(
                demands
                    .iter()
                    .map(|d| (d.item.stock_quantity, d.per_unit)),
            )
        } else {
            0
        };
        result.can_make = result.missing_ingredients.is_empty() && result.errors.is_empty();

        debug!(
            can_make = result.can_make,
            max_quantity = result.max_quantity,
            missing = result.missing_ingredients.len(),
            "Availability checked"
        );

        result
    }
}
