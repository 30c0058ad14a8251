//! # Sale Line Resolution
//!
//! Shared by the availability checker and the deduction engine, so both
//! answer from the same recipe expansion and the same store-scoped lookup.
//!
//! ```text
//! product_id ──► Product ──► RecipeTemplate
//!                                  │ effective_requirements(selected)
//!                                  ▼
//!                       RequirementLine (per unit)
//!                                  │ (store_id, ingredient_name) lookup
//!                                  ▼
//!                       InventoryItem of that store
//!                                  │ merge lines hitting the same item
//!                                  ▼
//!                       ItemDemand { item, per_unit }
//! ```

use larder_core::guard::ensure_same_store;
use larder_core::recipe::{effective_requirements, RequirementLine};
use larder_core::{CoreError, CoreResult, InventoryItem, Quantity, RecipeTemplate};
use tracing::debug;

use crate::traits::{InventoryLedger, RecipeSource};

/// Everything one item must supply per unit sold.
#[derive(Debug, Clone)]
pub(crate) struct ItemDemand {
    pub item: InventoryItem,
    pub per_unit: Quantity,
}

/// A requirement that could not be matched to a single stock row.
#[derive(Debug, Clone)]
pub(crate) struct Unresolved {
    pub line: RequirementLine,
    pub error: CoreError,
}

/// Loads the template behind a product.
///
/// ## Errors
/// - `UnknownProduct` if the product does not exist
/// - `UnknownRecipe` if it has no template, or its template is gone
pub(crate) async fn load_template(
    recipes: &dyn RecipeSource,
    product_id: &str,
) -> CoreResult<RecipeTemplate> {
    let product = recipes
        .get_product(product_id)
        .await?
        .ok_or_else(|| CoreError::UnknownProduct(product_id.to_string()))?;

    let template_id = product
        .recipe_template_id
        .ok_or_else(|| CoreError::UnknownRecipe(format!("product {} has no recipe", product_id)))?;

    recipes
        .get_template(&template_id)
        .await?
        .ok_or(CoreError::UnknownRecipe(template_id))
}

/// Resolves an ingredient name to exactly one active item of the store.
///
/// Zero matches is `MissingIngredient`, several is `AmbiguousIngredient`.
pub(crate) async fn resolve_item(
    ledger: &dyn InventoryLedger,
    store_id: &str,
    ingredient_name: &str,
) -> CoreResult<InventoryItem> {
    let mut matches = ledger.find_items(store_id, ingredient_name).await?;

    match matches.len() {
        0 => Err(CoreError::MissingIngredient {
            ingredient: ingredient_name.to_string(),
            store_id: store_id.to_string(),
        }),
        1 => {
            let item = matches.remove(0);
            ensure_same_store(store_id, &item)?;
            Ok(item)
        }
        n => Err(CoreError::AmbiguousIngredient {
            ingredient: ingredient_name.to_string(),
            store_id: store_id.to_string(),
            matches: n,
        }),
    }
}

/// Expands a template for the selection and matches every line to a stock
/// row of `store_id`.
///
/// Recipe-level problems (unknown choice, inexact portion) are returned as
/// `Err`. Lookup problems are per line and come back in the second vector so
/// callers can report every faulty ingredient at once. Storage failures
/// abort the whole resolution.
pub(crate) async fn resolve_demands(
    ledger: &dyn InventoryLedger,
    template: &RecipeTemplate,
    selected_choice_ids: &[String],
    store_id: &str,
) -> CoreResult<(Vec<ItemDemand>, Vec<Unresolved>)> {
    let lines = effective_requirements(template, selected_choice_ids)?;

    let mut demands: Vec<ItemDemand> = Vec::with_capacity(lines.len());
    let mut unresolved = Vec::new();

    for line in lines {
        match resolve_item(ledger, store_id, &line.ingredient_name).await {
            Ok(item) => {
                debug!(
                    ingredient = %line.ingredient_name,
                    item_id = %item.id,
                    per_unit = %line.per_unit,
                    "Resolved requirement"
                );
                match demands.iter_mut().find(|d| d.item.id == item.id) {
                    Some(existing) => {
                        existing.per_unit = existing
                            .per_unit
                            .checked_add(line.per_unit)
                            .ok_or_else(|| overflow(&line.ingredient_name))?;
                    }
                    None => demands.push(ItemDemand {
                        item,
                        per_unit: line.per_unit,
                    }),
                }
            }
            Err(error @ CoreError::StorageFailure(_)) => return Err(error),
            Err(error) => unresolved.push(Unresolved { line, error }),
        }
    }

    Ok((demands, unresolved))
}

fn overflow(ingredient: &str) -> CoreError {
    larder_core::ValidationError::InvalidRequirement {
        requirement: ingredient.to_string(),
        reason: "total per-unit quantity overflows".to_string(),
    }
    .into()
}
