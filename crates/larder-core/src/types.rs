//! # Domain Types
//!
//! Core domain types used throughout Larder.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌──────────────────────┐   ┌─────────────────┐  │
//! │  │    Product      │──►│   RecipeTemplate     │   │  InventoryItem  │  │
//! │  │  ─────────────  │   │  ──────────────────  │   │  ─────────────  │  │
//! │  │  id             │   │  id, name, category  │   │  id             │  │
//! │  │  name           │   │  ingredients ─┐      │   │  store_id       │  │
//! │  │  recipe_tmpl_id │   └───────────────┼──────┘   │  item_name      │  │
//! │  └─────────────────┘                   ▼          │  stock_quantity │  │
//! │                        ┌──────────────────────┐   │  version        │  │
//! │                        │ IngredientRequirement│   └────────┬────────┘  │
//! │                        │  role: base | choice │            │           │
//! │                        │  choice_group        │   name+store lookup    │
//! │                        │  portion_multiplier  │────────────┘           │
//! │                        └──────────────────────┘                         │
//! │                                                                         │
//! │  SaleLine ──► ResolvedDeduction ──► InventoryMovement (append-only)     │
//! │                      │                                                  │
//! │                      └──► DeductionOutcome (commit bookkeeping)         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Inventory items have:
//! - `id`: UUID v4 - immutable, referenced by movements
//! - Business key: `(store_id, item_name)` - what recipes refer to

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::quantity::Quantity;

// =============================================================================
// Portion Multiplier
// =============================================================================

/// Portion multiplier represented in basis points (bps).
///
/// ## Why Basis Points?
/// 1 basis point = 1/10000
/// 10000 bps = 1.0 (a "full add" topping)
/// 5000 bps = 0.5 (sauces and toppings on a "mini" variant)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
#[ts(export)]
pub struct PortionMultiplier(u32);

impl PortionMultiplier {
    /// 1.0
    pub const FULL: PortionMultiplier = PortionMultiplier(10_000);

    /// 0.5
    pub const HALF: PortionMultiplier = PortionMultiplier(5_000);

    /// Creates a multiplier from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        PortionMultiplier(bps)
    }

    /// Returns the multiplier in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Checks if the multiplier is zero (would deduct nothing).
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Default for PortionMultiplier {
    fn default() -> Self {
        PortionMultiplier::FULL
    }
}

impl std::fmt::Display for PortionMultiplier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // 5000 bps has the same digits as 0.5 in thousandths after /10
        let as_quantity = Quantity::from_thousandths(self.0 as i64 / 10);
        if self.0 % 10 == 0 {
            write!(f, "{}", as_quantity)
        } else {
            write!(f, "{}bps", self.0)
        }
    }
}

// =============================================================================
// Inventory Item
// =============================================================================

/// A raw ingredient stocked by one store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct InventoryItem {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Store that owns this row. Never changes after creation.
    pub store_id: String,

    /// Name recipes refer to ("Croissant", "Choco Flakes").
    pub item_name: String,

    /// Display unit ("pcs", "g", "ml").
    pub unit: String,

    /// Current stock. Never negative at rest.
    pub stock_quantity: Quantity,

    /// Low-stock threshold used by stock reports.
    pub minimum_threshold: Quantity,

    /// Cost per unit in cents, when known.
    pub unit_cost_cents: Option<i64>,

    /// Inactive items are invisible to ingredient lookup.
    pub is_active: bool,

    /// Incremented on every stock write (optimistic concurrency token).
    pub version: i64,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl InventoryItem {
    /// Whether stock is at or under the minimum threshold.
    #[inline]
    pub fn is_low_stock(&self) -> bool {
        self.stock_quantity <= self.minimum_threshold
    }

    /// Whether nothing is left.
    #[inline]
    pub fn is_out_of_stock(&self) -> bool {
        !self.stock_quantity.is_positive()
    }
}

// =============================================================================
// Product
// =============================================================================

/// A sellable product. Products are shared by all stores; stock is not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    pub id: String,
    pub name: String,
    /// Recipe template, if the product has one configured.
    pub recipe_template_id: Option<String>,
}

// =============================================================================
// Ingredient Role
// =============================================================================

/// Whether a requirement is always deducted or only when selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum IngredientRole {
    /// Always applied.
    Base,
    /// Applied only if its id is in `selected_choice_ids`.
    Choice,
}

impl IngredientRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngredientRole::Base => "base",
            IngredientRole::Choice => "choice",
        }
    }
}

// =============================================================================
// Recipe Template
// =============================================================================

/// One line of a recipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct IngredientRequirement {
    /// Referenced by `SaleLine::selected_choice_ids`.
    pub id: String,
    /// Logical name, resolved to an inventory item by name and store.
    pub ingredient_name: String,
    pub unit: String,
    /// Declared order within the template.
    pub position: i64,
    /// Recipe-declared amount per unit sold, before the portion multiplier.
    pub base_quantity: Quantity,
    pub role: IngredientRole,
    /// Set for every choice requirement, never for a base requirement.
    pub choice_group: Option<String>,
    pub portion_multiplier: PortionMultiplier,
}

impl IngredientRequirement {
    /// Amount deducted per unit sold (`base_quantity * portion_multiplier`).
    ///
    /// `None` when the product is not a whole thousandth; recipe validation
    /// rejects such templates.
    #[inline]
    pub fn per_unit_quantity(&self) -> Option<Quantity> {
        self.base_quantity.apply_portion(self.portion_multiplier)
    }
}

/// A recipe: an ordered list of ingredient requirements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RecipeTemplate {
    pub id: String,
    pub name: String,
    pub category: Option<String>,
    /// Sorted by `position`.
    pub ingredients: Vec<IngredientRequirement>,
}

impl RecipeTemplate {
    /// Looks up a requirement by id.
    pub fn requirement(&self, id: &str) -> Option<&IngredientRequirement> {
        self.ingredients.iter().find(|r| r.id == id)
    }

    /// Whether the template has any optional requirement.
    pub fn is_mix_and_match(&self) -> bool {
        self.ingredients
            .iter()
            .any(|r| r.role == IngredientRole::Choice)
    }
}

// =============================================================================
// Sale Line
// =============================================================================

/// A completed sale line handed over by the POS checkout flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleLine {
    pub product_id: String,
    /// Units sold (1..=999).
    pub quantity_sold: i64,
    /// Ids of the choice requirements picked by the cashier.
    #[serde(default)]
    pub selected_choice_ids: Vec<String>,
    pub store_id: String,
    /// Supplied by the caller for movement attribution.
    pub transaction_id: String,
    /// When set, a second call with the same key is a no-op.
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

// =============================================================================
// Resolved Deduction
// =============================================================================

/// One concrete decrement: subtract `quantity` from one inventory row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DeductionPair {
    pub inventory_item_id: String,
    pub item_name: String,
    pub quantity: Quantity,
}

/// The decrements for one sale line, one pair per inventory item.
///
/// Pairs targeting the same item are merged by summation and the list is
/// kept in ascending `inventory_item_id`, which is the application order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ResolvedDeduction {
    pub pairs: Vec<DeductionPair>,
}

impl ResolvedDeduction {
    /// Merges duplicate targets and sorts by item id.
    ///
    /// ## Example
    /// ```rust
    /// use larder_core::quantity::Quantity;
    /// use larder_core::types::{DeductionPair, ResolvedDeduction};
    ///
    /// let pair = |id: &str, t: i64| DeductionPair {
    ///     inventory_item_id: id.to_string(),
    ///     item_name: id.to_uppercase(),
    ///     quantity: Quantity::from_thousandths(t),
    /// };
    /// let resolved = ResolvedDeduction::from_pairs(vec![pair("b", 500), pair("a", 1000), pair("b", 250)]);
    ///
    /// assert_eq!(resolved.pairs.len(), 2);
    /// assert_eq!(resolved.pairs[0].inventory_item_id, "a");
    /// assert_eq!(resolved.pairs[1].quantity.thousandths(), 750);
    /// ```
    pub fn from_pairs(pairs: Vec<DeductionPair>) -> Self {
        let mut merged: Vec<DeductionPair> = Vec::with_capacity(pairs.len());
        for pair in pairs {
            match merged
                .iter_mut()
                .find(|p| p.inventory_item_id == pair.inventory_item_id)
            {
                Some(existing) => existing.quantity += pair.quantity,
                None => merged.push(pair),
            }
        }
        merged.sort_by(|a, b| a.inventory_item_id.cmp(&b.inventory_item_id));
        ResolvedDeduction { pairs: merged }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Total amount to subtract from one item.
    pub fn quantity_for(&self, inventory_item_id: &str) -> Option<Quantity> {
        self.pairs
            .iter()
            .find(|p| p.inventory_item_id == inventory_item_id)
            .map(|p| p.quantity)
    }
}

// =============================================================================
// Inventory Movement
// =============================================================================

/// Why a movement was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    /// Stock consumed by a sale.
    Deduction,
    /// Compensation for a partially applied sale line.
    Rollback,
    /// Explicit void of a committed transaction.
    Reversal,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::Deduction => "deduction",
            MovementType::Rollback => "rollback",
            MovementType::Reversal => "reversal",
        }
    }
}

/// Append-only audit record of one stock change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct InventoryMovement {
    pub id: String,
    /// Store the movement was written for; must match the item's store.
    pub store_id: String,
    pub inventory_item_id: String,
    /// Signed: negative for deductions, positive for compensation.
    pub quantity_change: Quantity,
    pub previous_quantity: Quantity,
    pub new_quantity: Quantity,
    pub reference_type: MovementType,
    pub transaction_id: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Deduction State Machine
// =============================================================================

/// Lifecycle of one sale line inside the deduction engine.
///
/// ```text
/// PENDING → RESOLVING → VALIDATING → APPLYING → COMMITTED
///               │            │           │
///               └──► FAILED ◄┘           └──► ROLLED_BACK
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DeductionStatus {
    Pending,
    Resolving,
    Validating,
    Applying,
    Committed,
    RolledBack,
    Failed,
}

impl DeductionStatus {
    /// Whether the line has reached a final state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeductionStatus::Committed | DeductionStatus::RolledBack | DeductionStatus::Failed
        )
    }
}

impl Default for DeductionStatus {
    fn default() -> Self {
        DeductionStatus::Pending
    }
}

// =============================================================================
// Deduction Outcome
// =============================================================================

/// Persisted result of a sale line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Committed,
    RolledBack,
    Failed,
    /// Committed, then voided by an explicit reversal.
    Reversed,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Committed => "committed",
            OutcomeStatus::RolledBack => "rolled_back",
            OutcomeStatus::Failed => "failed",
            OutcomeStatus::Reversed => "reversed",
        }
    }
}

/// The engine's commit bookkeeping, compared against the movement log by the
/// health monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DeductionOutcome {
    pub id: String,
    pub transaction_id: String,
    pub store_id: String,
    pub product_id: String,
    pub quantity_sold: i64,
    pub status: OutcomeStatus,
    /// Resolved pairs the engine reports as applied.
    pub items_processed: i64,
    pub idempotency_key: Option<String>,
    pub errors: Vec<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Operation Results
// =============================================================================

/// One ingredient that cannot cover the requested quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct IngredientShortfall {
    pub ingredient_name: String,
    /// `None` when no matching item exists in the store.
    pub inventory_item_id: Option<String>,
    pub needed: Quantity,
    pub available: Quantity,
}

/// Answer to "can this store make N of this product right now?".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AvailabilityResult {
    pub can_make: bool,
    /// Largest quantity all requirements could cover, capped at
    /// [`MAX_ITEM_QUANTITY`](crate::MAX_ITEM_QUANTITY), the most one sale
    /// line may carry. Stock for more than that still reports the cap.
    pub max_quantity: i64,
    pub missing_ingredients: Vec<String>,
    pub shortfalls: Vec<IngredientShortfall>,
    /// Lookup or storage problems encountered while checking.
    pub errors: Vec<String>,
}

impl AvailabilityResult {
    /// A negative answer naming a single missing entry.
    pub fn unavailable(missing: impl Into<String>, error: impl Into<String>) -> Self {
        AvailabilityResult {
            can_make: false,
            max_quantity: 0,
            missing_ingredients: vec![missing.into()],
            shortfalls: Vec::new(),
            errors: vec![error.into()],
        }
    }
}

/// What `apply_deduction` hands back to the POS layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DeductionResult {
    pub transaction_id: String,
    pub success: bool,
    pub status: DeductionStatus,
    pub resolved: ResolvedDeduction,
    pub errors: Vec<String>,
    /// Ingredients at fault, for the cashier.
    pub failed_ingredients: Vec<String>,
    /// True when an idempotency key matched an earlier committed line.
    pub already_applied: bool,
}

/// Summary of an explicit transaction reversal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReversalSummary {
    pub transaction_id: String,
    pub store_id: String,
    /// Pairs restored, in the order they were restored.
    pub restored: Vec<DeductionPair>,
    pub outcomes_reversed: i64,
}

// =============================================================================
// Health Monitoring
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum HealthClassification {
    Healthy,
    Warning,
    Critical,
}

/// Health verdict for one recent transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct HealthStatus {
    pub transaction_id: String,
    pub store_id: String,
    pub classification: HealthClassification,
    /// Recorded success with no net ledger movement.
    pub false_success: bool,
    /// Movements touching an item of another store.
    pub cross_store_leaks: i64,
    pub movement_count: i64,
    pub net_change: Quantity,
    pub items_processed: i64,
    pub message: String,
}

/// A non-healthy status forwarded by the monitor loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct HealthAlert {
    pub transaction_id: String,
    pub store_id: String,
    pub classification: HealthClassification,
    pub message: String,
    #[ts(as = "String")]
    pub raised_at: DateTime<Utc>,
}

/// Stock overview for one store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockReport {
    pub store_id: String,
    pub active_items: i64,
    pub low_stock: Vec<InventoryItem>,
    pub out_of_stock: Vec<InventoryItem>,
}

// =============================================================================
// Unit Tests
// =============================================================================
