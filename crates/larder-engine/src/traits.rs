//! # Collaborator Traits
//!
//! The engine never talks to SQLite directly. It is handed three
//! collaborators, each an `Arc<dyn Trait>`:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  AvailabilityChecker ──┐                                                │
//! │  DeductionEngine ──────┼──► RecipeSource     get_product, get_template  │
//! │  HealthMonitor ────────┼──► InventoryLedger  find_items, get_item,      │
//! │                        │                     conditional_subtract,      │
//! │                        │                     restore, append_movement,  │
//! │                        │                     deducted_transactions_since│
//! │                        └──► OutcomeLog       record, find_committed,    │
//! │                                              recent, mark_reversed      │
//! │                                                                         │
//! │  Production: larder_db::Database (store.rs)                             │
//! │  Tests:      failure-injecting wrappers                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every method reports failures as [`CoreError`](larder_core::CoreError):
//! `CrossStoreViolation` when the storage guard fires, `StorageFailure` for
//! everything else.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use larder_core::{
    CoreResult, DeductionOutcome, InventoryItem, InventoryMovement, Product, Quantity,
    RecipeTemplate,
};

/// Read-only access to the recipe catalog.
#[async_trait]
pub trait RecipeSource: Send + Sync {
    async fn get_product(&self, product_id: &str) -> CoreResult<Option<Product>>;

    async fn get_template(&self, template_id: &str) -> CoreResult<Option<RecipeTemplate>>;
}

/// Read/write access to the inventory ledger and its movement log.
#[async_trait]
pub trait InventoryLedger: Send + Sync {
    /// Active items of `store_id` whose name matches `item_name` ignoring
    /// case and whitespace. May return zero or several rows.
    async fn find_items(&self, store_id: &str, item_name: &str) -> CoreResult<Vec<InventoryItem>>;

    /// Fresh read of one row.
    async fn get_item(&self, item_id: &str) -> CoreResult<Option<InventoryItem>>;

    /// Active items of a store.
    async fn list_items(&self, store_id: &str) -> CoreResult<Vec<InventoryItem>>;

    /// Subtracts `amount` when the row is still at `expected_version` and
    /// holds at least `amount`. `Ok(false)` means the condition failed.
    async fn conditional_subtract(
        &self,
        item_id: &str,
        store_id: &str,
        amount: Quantity,
        expected_version: i64,
    ) -> CoreResult<bool>;

    /// Adds `amount` back. Returns `(previous, new)` stock.
    async fn restore(
        &self,
        item_id: &str,
        store_id: &str,
        amount: Quantity,
    ) -> CoreResult<(Quantity, Quantity)>;

    async fn append_movement(&self, movement: &InventoryMovement) -> CoreResult<()>;

    /// Movements attributed to a transaction, oldest first.
    async fn movements_for_transaction(
        &self,
        transaction_id: &str,
    ) -> CoreResult<Vec<InventoryMovement>>;

    /// `(transaction_id, store_id)` of transactions with a deduction
    /// movement written since `since`, oldest first.
    async fn deducted_transactions_since(
        &self,
        store_id: Option<&str>,
        since: DateTime<Utc>,
    ) -> CoreResult<Vec<(String, String)>>;

    /// Movements of a transaction touching an item that belongs to neither
    /// the movement's store nor `expected_store`.
    async fn cross_store_leaks(&self, transaction_id: &str, expected_store: &str)
        -> CoreResult<i64>;
}

/// The engine's own bookkeeping of sale line outcomes.
#[async_trait]
pub trait OutcomeLog: Send + Sync {
    async fn record(&self, outcome: &DeductionOutcome) -> CoreResult<()>;

    /// Committed outcome recorded under an idempotency key.
    async fn find_committed(&self, idempotency_key: &str) -> CoreResult<Option<DeductionOutcome>>;

    /// Outcomes since `since`, optionally for one store.
    async fn recent(
        &self,
        store_id: Option<&str>,
        since: DateTime<Utc>,
    ) -> CoreResult<Vec<DeductionOutcome>>;

    /// Flips committed outcomes of a transaction to reversed.
    async fn mark_reversed(&self, transaction_id: &str, store_id: &str) -> CoreResult<u64>;
}
