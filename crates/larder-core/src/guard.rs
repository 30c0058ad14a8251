//! # Cross-Store Guard
//!
//! A sale in store A must never touch stock in store B.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Check 1 (in-process, this module)                                      │
//! │    Deduction engine, VALIDATING phase                                   │
//! │    → CrossStoreViolation naming the item and both stores                │
//! │                                                                         │
//! │  Check 2 (storage, larder-db triggers)                                  │
//! │    BEFORE INSERT ON inventory_movements                                 │
//! │    BEFORE UPDATE OF store_id ON inventory_items                         │
//! │    → rejects writes that bypass the engine                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::{CoreError, CoreResult};
use crate::types::InventoryItem;

/// Whether a sale in `store_id` may touch `item`.
#[inline]
pub fn authorize(store_id: &str, item: &InventoryItem) -> bool {
    item.store_id == store_id
}

/// Like [`authorize`], but produces the error the engine reports.
pub fn ensure_same_store(store_id: &str, item: &InventoryItem) -> CoreResult<()> {
    if authorize(store_id, item) {
        return Ok(());
    }
    Err(CoreError::CrossStoreViolation {
        item: item.item_name.clone(),
        expected_store: store_id.to_string(),
        actual_store: item.store_id.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quantity::Quantity;
    use chrono::Utc;

    fn item(store_id: &str) -> InventoryItem {
        InventoryItem {
            id: "item-1".to_string(),
            store_id: store_id.to_string(),
            item_name: "Croissant".to_string(),
            unit: "pcs".to_string(),
            stock_quantity: Quantity::from_units(10),
            minimum_threshold: Quantity::zero(),
            unit_cost_cents: None,
            is_active: true,
            version: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_same_store_is_allowed() {
        assert!(authorize("store-a", &item("store-a")));
        assert!(ensure_same_store("store-a", &item("store-a")).is_ok());
    }

    #[test]
    fn test_other_store_is_rejected_with_both_ids() {
        assert!(!authorize("store-a", &item("store-b")));

        let err = ensure_same_store("store-a", &item("store-b")).unwrap_err();
        assert_eq!(
            err,
            CoreError::CrossStoreViolation {
                item: "Croissant".to_string(),
                expected_store: "store-a".to_string(),
                actual_store: "store-b".to_string(),
            }
        );
    }

    #[test]
    fn test_store_match_is_exact() {
        assert!(!authorize("Store-A", &item("store-a")));
        assert!(!authorize("", &item("store-a")));
    }
}
