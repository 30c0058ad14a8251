//! # Recipe Expansion
//!
//! Turns a recipe template plus the cashier's selections into the amounts to
//! deduct. Everything here is pure arithmetic; matching names to inventory
//! rows happens in the engine, against the store's ledger.
//!
//! ## Expansion Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  RecipeTemplate "Mini Croffle"                                          │
//! │    base   Croissant       0.5 × 1.0                                     │
//! │    base   Whipped Cream   0.5 × 1.0                                     │
//! │    base   Popsicle Stick  1.0 × 1.0                                     │
//! │    choice Choco Flakes    1.0 × 0.5  (topping)  ◄── selected            │
//! │    choice Caramel Sauce   1.0 × 0.5  (topping)                          │
//! │         │                                                               │
//! │         ▼  effective_requirements(template, ["choco"])                  │
//! │    Croissant 0.5, Whipped Cream 0.5, Popsicle Stick 1, Choco Flakes 0.5 │
//! │         │                                                               │
//! │         ▼  scale_requirements(.., quantity_sold)                        │
//! │    needed = per_unit × quantity_sold                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::quantity::Quantity;
use crate::types::{IngredientRole, RecipeTemplate};
use crate::MAX_ITEM_QUANTITY;

// =============================================================================
// Requirement Lines
// =============================================================================

/// A requirement that applies to this sale, with its per-unit amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementLine {
    pub requirement_id: String,
    pub ingredient_name: String,
    pub role: IngredientRole,
    /// `base_quantity * portion_multiplier`
    pub per_unit: Quantity,
}

/// A requirement line scaled by the quantity sold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaledRequirement {
    pub line: RequirementLine,
    pub needed: Quantity,
}

/// Builds the effective requirement set for a sale.
///
/// All base requirements apply. A choice requirement applies only when its
/// id is selected. A group with nothing selected contributes nothing, and
/// several members of one group may be selected together.
///
/// ## Errors
/// - `UnknownChoice` if a selected id is not a choice requirement of the
///   template (base ids included: they cannot be "selected")
/// - `Validation` if a requirement's portion is not exact
///
/// ## Example
/// ```rust
/// use larder_core::recipe::effective_requirements;
/// use larder_core::types::{IngredientRequirement, IngredientRole, PortionMultiplier, RecipeTemplate};
///
/// let template = RecipeTemplate {
///     id: "tmpl".into(),
///     name: "Croffle".into(),
///     category: None,
///     ingredients: vec![IngredientRequirement {
///         id: "req-1".into(),
///         ingredient_name: "Croissant".into(),
///         unit: "pcs".into(),
///         position: 0,
///         base_quantity: "1".parse().unwrap(),
///         role: IngredientRole::Base,
///         choice_group: None,
///         portion_multiplier: PortionMultiplier::FULL,
///     }],
/// };
///
/// let lines = effective_requirements(&template, &[]).unwrap();
/// assert_eq!(lines.len(), 1);
/// ```
pub fn effective_requirements(
    template: &RecipeTemplate,
    selected_choice_ids: &[String],
) -> CoreResult<Vec<RequirementLine>> {
    let selected: HashSet<&str> = selected_choice_ids.iter().map(String::as_str).collect();

    for id in &selected {
        let is_choice = template
            .requirement(id)
            .map(|r| r.role == IngredientRole::Choice)
            .unwrap_or(false);
        if !is_choice {
            return Err(CoreError::UnknownChoice {
                choice_id: (*id).to_string(),
                template_id: template.id.clone(),
            });
        }
    }

    let mut ordered: Vec<_> = template.ingredients.iter().collect();
    ordered.sort_by_key(|r| r.position);

    ordered
        .into_iter()
        .filter(|r| match r.role {
            IngredientRole::Base => true,
            IngredientRole::Choice => selected.contains(r.id.as_str()),
        })
        .map(|r| {
            let per_unit = r.per_unit_quantity().ok_or_else(|| {
                ValidationError::InvalidRequirement {
                    requirement: r.ingredient_name.clone(),
                    reason: format!(
                        "{} × {} is not a whole thousandth",
                        r.base_quantity, r.portion_multiplier
                    ),
                }
            })?;
            Ok(RequirementLine {
                requirement_id: r.id.clone(),
                ingredient_name: r.ingredient_name.clone(),
                role: r.role,
                per_unit,
            })
        })
        .collect()
}

/// Multiplies every line by the quantity sold.
pub fn scale_requirements(
    lines: Vec<RequirementLine>,
    quantity_sold: i64,
) -> CoreResult<Vec<ScaledRequirement>> {
    lines
        .into_iter()
        .map(|line| {
            let needed = line.per_unit.checked_mul_units(quantity_sold).ok_or_else(|| {
                ValidationError::OutOfRange {
                    field: "quantity_sold".to_string(),
                    min: 1,
                    max: MAX_ITEM_QUANTITY,
                }
            })?;
            Ok(ScaledRequirement { line, needed })
        })
        .collect()
}

// =============================================================================
// Availability Arithmetic
// =============================================================================

/// Largest sellable quantity given `(available, per_unit_total)` per item.
///
/// `floor(min(available / per_unit))`, capped at the cart's maximum item
/// quantity. A recipe with nothing to deduct is limited only by that cap.
///
/// ## Example
/// ```rust
/// use larder_core::quantity::Quantity;
/// use larder_core::recipe::max_sellable;
///
/// let q = |s: &str| s.parse::<Quantity>().unwrap();
/// let max = max_sellable([(q("10"), q("0.5")), (q("5"), q("0.5")), (q("10"), q("1"))]);
/// assert_eq!(max, 10);
/// ```
pub fn max_sellable<I>(entries: I) -> i64
where
    I: IntoIterator<Item = (Quantity, Quantity)>,
{
    entries
        .into_iter()
        .filter_map(|(available, per_unit)| available.whole_multiples_of(per_unit))
        .min()
        .unwrap_or(MAX_ITEM_QUANTITY)
        .clamp(0, MAX_ITEM_QUANTITY)
}

/// Normalizes an ingredient name for store-scoped lookup.
///
/// Case-insensitive and whitespace-insensitive: trims, collapses runs of
/// whitespace to a single space, lowercases.
///
/// ## Example
/// ```rust
/// use larder_core::recipe::normalize_ingredient_name;
///
/// assert_eq!(normalize_ingredient_name("  Choco   Flakes "), "choco flakes");
/// ```
pub fn normalize_ingredient_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{IngredientRequirement, PortionMultiplier};

    fn q(s: &str) -> Quantity {
        s.parse().unwrap()
    }

    fn base(id: &str, name: &str, qty: &str, position: i64) -> IngredientRequirement {
        IngredientRequirement {
            id: id.to_string(),
            ingredient_name: name.to_string(),
            unit: "pcs".to_string(),
            position,
            base_quantity: q(qty),
            role: IngredientRole::Base,
            choice_group: None,
            portion_multiplier: PortionMultiplier::FULL,
        }
    }

    fn choice(id: &str, name: &str, group: &str, position: i64) -> IngredientRequirement {
        IngredientRequirement {
            id: id.to_string(),
            ingredient_name: name.to_string(),
            unit: "g".to_string(),
            position,
            base_quantity: q("1"),
            role: IngredientRole::Choice,
            choice_group: Some(group.to_string()),
            portion_multiplier: PortionMultiplier::HALF,
        }
    }

    fn mini_croffle() -> RecipeTemplate {
        RecipeTemplate {
            id: "tmpl-mini".to_string(),
            name: "Mini Croffle".to_string(),
            category: Some("croffle".to_string()),
            ingredients: vec![
                choice("choco", "Choco Flakes", "topping", 3),
                base("croissant", "Croissant", "0.5", 0),
                base("cream", "Whipped Cream", "0.5", 1),
                base("stick", "Popsicle Stick", "1", 2),
                choice("caramel", "Caramel Sauce", "topping", 4),
            ],
        }
    }

    fn names(lines: &[RequirementLine]) -> Vec<&str> {
        lines.iter().map(|l| l.ingredient_name.as_str()).collect()
    }

    #[test]
    fn test_selected_choice_is_added_after_bases_in_position_order() {
        let lines = effective_requirements(&mini_croffle(), &["choco".to_string()]).unwrap();

        assert_eq!(
            names(&lines),
            vec!["Croissant", "Whipped Cream", "Popsicle Stick", "Choco Flakes"]
        );
        assert_eq!(lines[3].per_unit, q("0.5"));
        assert_eq!(lines[2].per_unit, q("1"));
    }

    #[test]
    fn test_no_selection_yields_only_bases() {
        let lines = effective_requirements(&mini_croffle(), &[]).unwrap();
        assert_eq!(lines.len(), 3);
        assert!(lines.iter().all(|l| l.role == IngredientRole::Base));
    }

    #[test]
    fn test_two_groups_at_half_portion() {
        let mut template = mini_croffle();
        template
            .ingredients
            .push(choice("nuts", "Crushed Nuts", "crunch", 5));

        let selected = vec!["caramel".to_string(), "nuts".to_string()];
        let scaled = scale_requirements(effective_requirements(&template, &selected).unwrap(), 4)
            .unwrap();

        let choices: Vec<_> = scaled
            .iter()
            .filter(|s| s.line.role == IngredientRole::Choice)
            .collect();
        assert_eq!(choices.len(), 2);
        assert!(choices.iter().all(|s| s.needed == q("2")));

        let croissant = scaled
            .iter()
            .find(|s| s.line.ingredient_name == "Croissant")
            .unwrap();
        assert_eq!(croissant.needed, q("2"));
    }

    #[test]
    fn test_duplicate_selection_counts_once() {
        let selected = vec!["choco".to_string(), "choco".to_string()];
        let lines = effective_requirements(&mini_croffle(), &selected).unwrap();
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn test_unknown_choice_is_rejected() {
        let err = effective_requirements(&mini_croffle(), &["sprinkles".to_string()]).unwrap_err();
        assert!(matches!(err, CoreError::UnknownChoice { ref choice_id, .. } if choice_id == "sprinkles"));
    }

    #[test]
    fn test_base_id_cannot_be_selected() {
        let err = effective_requirements(&mini_croffle(), &["croissant".to_string()]).unwrap_err();
        assert!(matches!(err, CoreError::UnknownChoice { .. }));
    }

    #[test]
    fn test_inexact_portion_is_rejected() {
        let mut template = mini_croffle();
        template.ingredients[0].base_quantity = q("0.001");
        let err = effective_requirements(&template, &["choco".to_string()]).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn test_scale_overflow_is_validation_error() {
        let lines = vec![RequirementLine {
            requirement_id: "r".into(),
            ingredient_name: "Flour".into(),
            role: IngredientRole::Base,
            per_unit: Quantity::from_thousandths(i64::MAX / 2),
        }];
        assert!(scale_requirements(lines, 3).is_err());
    }

    #[test]
    fn test_max_sellable() {
        // Croissant 10 / 0.5, Choco Flakes 5 / 0.5, Stick 10 / 1
        assert_eq!(
            max_sellable([(q("10"), q("0.5")), (q("5"), q("0.5")), (q("10"), q("1"))]),
            10
        );
        assert_eq!(max_sellable([(q("0.3"), q("0.5"))]), 0);
        assert_eq!(max_sellable([(q("4.9"), q("0.5"))]), 9);
        assert_eq!(max_sellable(Vec::new()), MAX_ITEM_QUANTITY);
        assert_eq!(max_sellable([(q("100000"), q("0.001"))]), MAX_ITEM_QUANTITY);
    }

    #[test]
    fn test_normalize_ingredient_name() {
        assert_eq!(normalize_ingredient_name("Choco Flakes"), "choco flakes");
        assert_eq!(normalize_ingredient_name("\tchoco\n flakes"), "choco flakes");
        assert_eq!(normalize_ingredient_name("   "), "");
    }
}
