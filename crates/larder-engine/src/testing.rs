//! Test fixtures: an in-memory Mini Croffle store and ledger doubles that
//! inject failures.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use larder_core::{
    CoreError, CoreResult, DeductionOutcome, IngredientRequirement, IngredientRole, InventoryItem,
    InventoryMovement, OutcomeStatus, PortionMultiplier, Product, Quantity, RecipeTemplate,
    SaleLine,
};
use larder_db::{Database, DbConfig, NewInventoryItem};

use crate::traits::{InventoryLedger, OutcomeLog};

pub const STORE_A: &str = "store-a";
pub const STORE_B: &str = "store-b";

pub fn q(s: &str) -> Quantity {
    s.parse().unwrap()
}

fn requirement(
    id: &str,
    name: &str,
    base: &str,
    position: i64,
    group: Option<&str>,
) -> IngredientRequirement {
    IngredientRequirement {
        id: id.to_string(),
        ingredient_name: name.to_string(),
        unit: "pcs".to_string(),
        position,
        base_quantity: q(base),
        role: if group.is_some() {
            IngredientRole::Choice
        } else {
            IngredientRole::Base
        },
        choice_group: group.map(str::to_string),
        portion_multiplier: if group.is_some() {
            PortionMultiplier::HALF
        } else {
            PortionMultiplier::FULL
        },
    }
}

/// Mini Croffle: Croissant 0.5, Whipped Cream 0.5, Popsicle Stick 1 and a
/// "topping" group of Choco Flakes / Caramel Sauce at half portion.
pub fn mini_croffle_template() -> RecipeTemplate {
    RecipeTemplate {
        id: "tmpl-mini-croffle".to_string(),
        name: "Mini Croffle".to_string(),
        category: Some("croffle".to_string()),
        ingredients: vec![
            requirement("mini-croissant", "Croissant", "0.5", 0, None),
            requirement("mini-cream", "Whipped Cream", "0.5", 1, None),
            requirement("mini-stick", "Popsicle Stick", "1", 2, None),
            requirement("mini-choco", "Choco Flakes", "1", 3, Some("topping")),
            requirement("mini-caramel", "Caramel Sauce", "1", 4, Some("topping")),
        ],
    }
}

/// Store A stocks every Mini Croffle ingredient (10/10/10/5/5). Store B
/// only stocks 10 Croissants.
pub async fn mini_croffle_db() -> Database {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();

    db.recipes()
        .insert_template(&mini_croffle_template())
        .await
        .unwrap();
    db.recipes()
        .insert_product(&Product {
            id: "mini-croffle".to_string(),
            name: "Mini Croffle".to_string(),
            recipe_template_id: Some("tmpl-mini-croffle".to_string()),
        })
        .await
        .unwrap();

    for (name, stock) in [
        ("Croissant", "10"),
        ("Whipped Cream", "10"),
        ("Popsicle Stick", "10"),
        ("Choco Flakes", "5"),
        ("Caramel Sauce", "5"),
    ] {
        db.inventory()
            .insert(&NewInventoryItem::new(STORE_A, name, q(stock)).minimum_threshold(q("2")))
            .await
            .unwrap();
    }

    db.inventory()
        .insert(&NewInventoryItem::new(STORE_B, "Croissant", q("10")))
        .await
        .unwrap();

    db
}

/// Overwrites an item's stock, bumping its version like any other writer.
pub async fn stock_of(db: &Database, store_id: &str, name: &str, stock: &str) {
    sqlx::query(
        "UPDATE inventory_items SET stock_quantity = ?1, version = version + 1 \
         WHERE store_id = ?2 AND item_name = ?3",
    )
    .bind(q(stock))
    .bind(store_id)
    .bind(name)
    .execute(db.pool())
    .await
    .unwrap();
}

/// The single active item of that name in the store.
pub async fn item(db: &Database, store_id: &str, name: &str) -> InventoryItem {
    db.inventory()
        .find_by_name(store_id, name)
        .await
        .unwrap()
        .remove(0)
}

pub async fn stock(db: &Database, store_id: &str, name: &str) -> String {
    item(db, store_id, name).await.stock_quantity.to_string()
}

pub fn sale(transaction_id: &str, quantity_sold: i64, choices: &[&str]) -> SaleLine {
    SaleLine {
        product_id: "mini-croffle".to_string(),
        quantity_sold,
        selected_choice_ids: choices.iter().map(|c| c.to_string()).collect(),
        store_id: STORE_A.to_string(),
        transaction_id: transaction_id.to_string(),
        idempotency_key: None,
    }
}

// =============================================================================
// Fault Injection
// =============================================================================

/// What goes wrong, and for which item.
#[derive(Debug, Clone)]
pub enum Fault {
    /// Conditional subtract returns a storage error.
    SubtractError,
    /// Conditional subtract never wins.
    AlwaysConflict,
    /// Another terminal sells this much right before the first subtract.
    ConcurrentSale(Quantity),
    /// Writing the deduction movement fails.
    AppendError,
    /// Restoring stock fails.
    RestoreError,
}

/// Delegates to a real database, failing on chosen items by name.
pub struct FaultyLedger {
    pub inner: Database,
    faults: Vec<(String, Fault)>,
    pub subtract_calls: AtomicU32,
}

impl FaultyLedger {
    pub fn new(inner: Database, target: &str, fault: Fault) -> Self {
        FaultyLedger {
            inner,
            faults: vec![(target.to_string(), fault)],
            subtract_calls: AtomicU32::new(0),
        }
    }

    /// Adds a second failing item.
    pub fn and(mut self, target: &str, fault: Fault) -> Self {
        self.faults.push((target.to_string(), fault));
        self
    }

    async fn fault_for(&self, item_id: &str) -> Option<(&str, &Fault)> {
        let item = self.inner.inventory().get_by_id(item_id).await.ok()??;
        self.faults
            .iter()
            .find(|(name, _)| *name == item.item_name)
            .map(|(name, fault)| (name.as_str(), fault))
    }
}

fn injected(target: &str) -> CoreError {
    CoreError::StorageFailure(format!("injected fault on {}", target))
}

#[async_trait]
impl InventoryLedger for FaultyLedger {
    async fn find_items(&self, store_id: &str, item_name: &str) -> CoreResult<Vec<InventoryItem>> {
        self.inner.find_items(store_id, item_name).await
    }

    async fn get_item(&self, item_id: &str) -> CoreResult<Option<InventoryItem>> {
        self.inner.get_item(item_id).await
    }

    async fn list_items(&self, store_id: &str) -> CoreResult<Vec<InventoryItem>> {
        self.inner.list_items(store_id).await
    }

    async fn conditional_subtract(
        &self,
        item_id: &str,
        store_id: &str,
        amount: Quantity,
        expected_version: i64,
    ) -> CoreResult<bool> {
        if let Some((target, fault)) = self.fault_for(item_id).await {
            let call = self.subtract_calls.fetch_add(1, Ordering::SeqCst);
            match fault {
                Fault::SubtractError => return Err(injected(target)),
                Fault::AlwaysConflict => return Ok(false),
                Fault::ConcurrentSale(sold) if call == 0 => {
                    let current = self.inner.get_item(item_id).await?.unwrap();
                    assert!(self
                        .inner
                        .conditional_subtract(item_id, store_id, *sold, current.version)
                        .await?);
                }
                _ => {}
            }
        }
        self.inner
            .conditional_subtract(item_id, store_id, amount, expected_version)
            .await
    }

    async fn restore(
        &self,
        item_id: &str,
        store_id: &str,
        amount: Quantity,
    ) -> CoreResult<(Quantity, Quantity)> {
        if let Some((target, Fault::RestoreError)) = self.fault_for(item_id).await {
            return Err(injected(target));
        }
        self.inner.restore(item_id, store_id, amount).await
    }

    async fn append_movement(&self, movement: &InventoryMovement) -> CoreResult<()> {
        if let Some((target, Fault::AppendError)) =
            self.fault_for(&movement.inventory_item_id).await
        {
            return Err(injected(target));
        }
        self.inner.append_movement(movement).await
    }

    async fn movements_for_transaction(
        &self,
        transaction_id: &str,
    ) -> CoreResult<Vec<InventoryMovement>> {
        self.inner.movements_for_transaction(transaction_id).await
    }

    async fn deducted_transactions_since(
        &self,
        store_id: Option<&str>,
        since: DateTime<Utc>,
    ) -> CoreResult<Vec<(String, String)>> {
        self.inner.deducted_transactions_since(store_id, since).await
    }

    async fn cross_store_leaks(
        &self,
        transaction_id: &str,
        expected_store: &str,
    ) -> CoreResult<i64> {
        self.inner.cross_store_leaks(transaction_id, expected_store).await
    }
}

/// A ledger whose lookups hand back another store's row, as a buggy adapter
/// or a mis-scoped query would.
pub struct LeakyLedger {
    pub inner: Database,
    pub leak_from: String,
}

#[async_trait]
impl InventoryLedger for LeakyLedger {
    async fn find_items(&self, _store_id: &str, item_name: &str) -> CoreResult<Vec<InventoryItem>> {
        self.inner.find_items(&self.leak_from, item_name).await
    }

    async fn get_item(&self, item_id: &str) -> CoreResult<Option<InventoryItem>> {
        self.inner.get_item(item_id).await
    }

    async fn list_items(&self, store_id: &str) -> CoreResult<Vec<InventoryItem>> {
        self.inner.list_items(store_id).await
    }

    async fn conditional_subtract(
        &self,
        item_id: &str,
        store_id: &str,
        amount: Quantity,
        expected_version: i64,
    ) -> CoreResult<bool> {
        self.inner
            .conditional_subtract(item_id, store_id, amount, expected_version)
            .await
    }

    async fn restore(
        &self,
        item_id: &str,
        store_id: &str,
        amount: Quantity,
    ) -> CoreResult<(Quantity, Quantity)> {
        self.inner.restore(item_id, store_id, amount).await
    }

    async fn append_movement(&self, movement: &InventoryMovement) -> CoreResult<()> {
        self.inner.append_movement(movement).await
    }

    async fn movements_for_transaction(
        &self,
        transaction_id: &str,
    ) -> CoreResult<Vec<InventoryMovement>> {
        self.inner.movements_for_transaction(transaction_id).await
    }

    async fn deducted_transactions_since(
        &self,
        store_id: Option<&str>,
        since: DateTime<Utc>,
    ) -> CoreResult<Vec<(String, String)>> {
        self.inner.deducted_transactions_since(store_id, since).await
    }

    async fn cross_store_leaks(
        &self,
        transaction_id: &str,
        expected_store: &str,
    ) -> CoreResult<i64> {
        self.inner.cross_store_leaks(transaction_id, expected_store).await
    }
}

/// An outcome log that refuses committed outcomes and records the rest.
pub struct CommitRejectingOutcomes {
    pub inner: Database,
}

#[async_trait]
impl OutcomeLog for CommitRejectingOutcomes {
    async fn record(&self, outcome: &DeductionOutcome) -> CoreResult<()> {
        if outcome.status == OutcomeStatus::Committed {
            return Err(CoreError::StorageFailure("outcome log unavailable".to_string()));
        }
        self.inner.record(outcome).await
    }

    async fn find_committed(&self, idempotency_key: &str) -> CoreResult<Option<DeductionOutcome>> {
        self.inner.find_committed(idempotency_key).await
    }

    async fn recent(
        &self,
        store_id: Option<&str>,
        since: DateTime<Utc>,
    ) -> CoreResult<Vec<DeductionOutcome>> {
        self.inner.recent(store_id, since).await
    }

    async fn mark_reversed(&self, transaction_id: &str, store_id: &str) -> CoreResult<u64> {
        self.inner.mark_reversed(transaction_id, store_id).await
    }
}
