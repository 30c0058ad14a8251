//! # SQLite Adapter
//!
//! Implements the collaborator traits for [`larder_db::Database`].
//!
//! ## Error Mapping
//! ```text
//! DbError::CrossStoreViolation  → CoreError::CrossStoreViolation (item, both stores)
//! DbError::*                    → CoreError::StorageFailure
//! ```
//!
//! The trigger message does not carry the stores involved, so the adapter
//! looks the item up again to report its real owner.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::warn;

use larder_core::{
    CoreError, CoreResult, DeductionOutcome, InventoryItem, InventoryMovement, Product, Quantity,
    RecipeTemplate,
};
use larder_db::{Database, DbError};

use crate::traits::{InventoryLedger, OutcomeLog, RecipeSource};

fn storage(err: DbError) -> CoreError {
    CoreError::StorageFailure(err.to_string())
}

#[async_trait]
impl RecipeSource for Database {
    async fn get_product(&self, product_id: &str) -> CoreResult<Option<Product>> {
        self.recipes().get_product(product_id).await.map_err(storage)
    }

    async fn get_template(&self, template_id: &str) -> CoreResult<Option<RecipeTemplate>> {
        self.recipes().get_template(template_id).await.map_err(storage)
    }
}

#[async_trait]
impl InventoryLedger for Database {
    async fn find_items(&self, store_id: &str, item_name: &str) -> CoreResult<Vec<InventoryItem>> {
        self.inventory()
            .find_by_name(store_id, item_name)
            .await
            .map_err(storage)
    }

    async fn get_item(&self, item_id: &str) -> CoreResult<Option<InventoryItem>> {
        self.inventory().get_by_id(item_id).await.map_err(storage)
    }

    async fn list_items(&self, store_id: &str) -> CoreResult<Vec<InventoryItem>> {
        self.inventory().list_by_store(store_id).await.map_err(storage)
    }

    async fn conditional_subtract(
        &self,
        item_id: &str,
        store_id: &str,
        amount: Quantity,
        expected_version: i64,
    ) -> CoreResult<bool> {
        self.inventory()
            .conditional_subtract(item_id, store_id, amount, expected_version)
            .await
            .map_err(storage)
    }

    async fn restore(
        &self,
        item_id: &str,
        store_id: &str,
        amount: Quantity,
    ) -> CoreResult<(Quantity, Quantity)> {
        self.inventory()
            .restore(item_id, store_id, amount)
            .await
            .map_err(storage)
    }

    async fn append_movement(&self, movement: &InventoryMovement) -> CoreResult<()> {
        match self.inventory().append_movement(movement).await {
            Ok(()) => Ok(()),
            Err(DbError::CrossStoreViolation(message)) => {
                warn!(
                    item_id = %movement.inventory_item_id,
                    store_id = %movement.store_id,
                    %message,
                    "Storage guard rejected movement"
                );
                let owner = self
                    .inventory()
                    .get_by_id(&movement.inventory_item_id)
                    .await
                    .ok()
                    .flatten();
                let (item, actual_store) = match owner {
                    Some(item) => (item.item_name, item.store_id),
                    None => (movement.inventory_item_id.clone(), "unknown".to_string()),
                };
                Err(CoreError::CrossStoreViolation {
                    item,
                    expected_store: movement.store_id.clone(),
                    actual_store,
                })
            }
            Err(e) => Err(storage(e)),
        }
    }

    async fn movements_for_transaction(
        &self,
        transaction_id: &str,
    ) -> CoreResult<Vec<InventoryMovement>> {
        self.inventory()
            .movements_for_transaction(transaction_id)
            .await
            .map_err(storage)
    }

    async fn deducted_transactions_since(
        &self,
        store_id: Option<&str>,
        since: DateTime<Utc>,
    ) -> CoreResult<Vec<(String, String)>> {
        self.inventory()
            .deducted_transactions_since(store_id, since)
            .await
            .map_err(storage)
    }

    async fn cross_store_leaks(
        &self,
        transaction_id: &str,
        expected_store: &str,
    ) -> CoreResult<i64> {
        self.inventory()
            .cross_store_leaks(transaction_id, expected_store)
            .await
            .map_err(storage)
    }
}

#[async_trait]
impl OutcomeLog for Database {
    async fn record(&self, outcome: &DeductionOutcome) -> CoreResult<()> {
        self.outcomes().insert(outcome).await.map_err(storage)
    }

    async fn find_committed(&self, idempotency_key: &str) -> CoreResult<Option<DeductionOutcome>> {
        self.outcomes()
            .find_committed_by_key(idempotency_key)
            .await
            .map_err(storage)
    }

    async fn recent(
        &self,
        store_id: Option<&str>,
        since: DateTime<Utc>,
    ) -> CoreResult<Vec<DeductionOutcome>> {
        self.outcomes().recent(store_id, since).await.map_err(storage)
    }

    async fn mark_reversed(&self, transaction_id: &str, store_id: &str) -> CoreResult<u64> {
        self.outcomes()
            .mark_reversed(transaction_id, store_id)
            .await
            .map_err(storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use larder_core::MovementType;
    use larder_db::{DbConfig, NewInventoryItem};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_trigger_rejection_names_both_stores() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let item = db
            .inventory()
            .insert(&NewInventoryItem::new("store-b", "Croissant", Quantity::from_units(10)))
            .await
            .unwrap();

        let movement = InventoryMovement {
            id: Uuid::new_v4().to_string(),
            store_id: "store-a".to_string(),
            inventory_item_id: item.id.clone(),
            quantity_change: Quantity::from_thousandths(-500),
            previous_quantity: Quantity::from_units(10),
            new_quantity: Quantity::from_thousandths(9_500),
            reference_type: MovementType::Deduction,
            transaction_id: "txn-1".to_string(),
            created_at: Utc::now(),
        };

        let err = InventoryLedger::append_movement(&db, &movement).await.unwrap_err();
        assert_eq!(
            err,
            CoreError::CrossStoreViolation {
                item: "Croissant".to_string(),
                expected_store: "store-a".to_string(),
                actual_store: "store-b".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_closed_pool_is_a_storage_failure() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.close().await;

        let err = InventoryLedger::find_items(&db, "store-a", "Croissant")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::StorageFailure(_)));
    }
}
