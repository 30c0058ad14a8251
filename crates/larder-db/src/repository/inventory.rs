//! # Inventory Repository
//!
//! Per-store stock rows and the append-only movement log.
//!
//! ## Conditional Subtract
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                 Optimistic Stock Update                                 │
//! │                                                                         │
//! │  ❌ WRONG: read, compute, write back                                    │
//! │     SELECT stock → 10                                                   │
//! │     UPDATE SET stock = 9.5        (another terminal sold in between)    │
//! │                                                                         │
//! │  ✅ CORRECT: one guarded statement                                      │
//! │     UPDATE inventory_items                                              │
//! │        SET stock_quantity = stock_quantity - :amount,                   │
//! │            version = version + 1                                        │
//! │      WHERE id = :id AND store_id = :store                               │
//! │        AND version = :seen_version                                      │
//! │        AND stock_quantity >= :amount                                    │
//! │                                                                         │
//! │  rows_affected = 1 → applied against exactly the stock we read          │
//! │  rows_affected = 0 → lost the race or not enough stock: caller decides  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use larder_core::recipe::normalize_ingredient_name;
use larder_core::validation::{validate_item_name, validate_stock_quantity, validate_store_id};
use larder_core::{InventoryItem, InventoryMovement, MovementType, Quantity};

const ITEM_COLUMNS: &str = r#"
    id, store_id, item_name, unit,
    stock_quantity, minimum_threshold, unit_cost_cents,
    is_active, version, created_at, updated_at
"#;

const MOVEMENT_COLUMNS: &str = r#"
    id, store_id, inventory_item_id,
    quantity_change, previous_quantity, new_quantity,
    reference_type, transaction_id, created_at
"#;

// =============================================================================
// New Item
// =============================================================================

/// Input for creating a stock row.
#[derive(Debug, Clone)]
pub struct NewInventoryItem {
    pub store_id: String,
    pub item_name: String,
    pub unit: String,
    pub stock_quantity: Quantity,
    pub minimum_threshold: Quantity,
    pub unit_cost_cents: Option<i64>,
}

impl NewInventoryItem {
    /// Creates an item counted in pieces with no low-stock threshold.
    pub fn new(
        store_id: impl Into<String>,
        item_name: impl Into<String>,
        stock_quantity: Quantity,
    ) -> Self {
        NewInventoryItem {
            store_id: store_id.into(),
            item_name: item_name.into(),
            unit: "pcs".to_string(),
            stock_quantity,
            minimum_threshold: Quantity::zero(),
            unit_cost_cents: None,
        }
    }

    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn minimum_threshold(mut self, threshold: Quantity) -> Self {
        self.minimum_threshold = threshold;
        self
    }

    pub fn unit_cost_cents(mut self, cents: i64) -> Self {
        self.unit_cost_cents = Some(cents);
        self
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for the inventory ledger.
#[derive(Debug, Clone)]
pub struct InventoryRepository {
    pool: SqlitePool,
}

impl InventoryRepository {
    /// Creates a new InventoryRepository.
    pub fn new(pool: SqlitePool) -> Self {
        InventoryRepository { pool }
    }

    /// Inserts a new stock row.
    ///
    /// ## Returns
    /// * `Ok(InventoryItem)` - Inserted item with generated id
    /// * `Err(DbError::UniqueViolation)` - Name already used in this store
    /// * `Err(DbError::Invalid)` - Empty name/store or negative stock
    pub async fn insert(&self, new: &NewInventoryItem) -> DbResult<InventoryItem> {
        validate_store_id(&new.store_id)?;
        validate_item_name(&new.item_name)?;
        validate_stock_quantity(new.stock_quantity)?;

        let now = Utc::now();
        let item = InventoryItem {
            id: Uuid::new_v4().to_string(),
            store_id: new.store_id.clone(),
            item_name: new.item_name.trim().to_string(),
            unit: new.unit.clone(),
            stock_quantity: new.stock_quantity,
            minimum_threshold: new.minimum_threshold,
            unit_cost_cents: new.unit_cost_cents,
            is_active: true,
            version: 0,
            created_at: now,
            updated_at: now,
        };

        debug!(store_id = %item.store_id, item_name = %item.item_name, "Inserting inventory item");

        sqlx::query(
            r#"
            INSERT INTO inventory_items (
                id, store_id, item_name, name_key, unit,
                stock_quantity, minimum_threshold, unit_cost_cents,
                is_active, version, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&item.id)
        .bind(&item.store_id)
        .bind(&item.item_name)
        .bind(normalize_ingredient_name(&item.item_name))
        .bind(&item.unit)
        .bind(item.stock_quantity)
        .bind(item.minimum_threshold)
        .bind(item.unit_cost_cents)
        .bind(item.is_active)
        .bind(item.version)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(item)
    }

    /// Gets an item by id, active or not.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<InventoryItem>> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM inventory_items WHERE id = ?1");
        let item = sqlx::query_as::<_, InventoryItem>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(item)
    }

    /// Finds the active items of one store matching an ingredient name.
    ///
    /// Matching ignores case and whitespace differences. The caller decides
    /// what zero or several matches mean; nothing here picks "the first".
    pub async fn find_by_name(&self, store_id: &str, name: &str) -> DbResult<Vec<InventoryItem>> {
        let key = normalize_ingredient_name(name);
        debug!(store_id = %store_id, name_key = %key, "Looking up ingredient");

        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM inventory_items \
             WHERE store_id = ?1 AND name_key = ?2 AND is_active = 1 \
             ORDER BY id"
        );
        let items = sqlx::query_as::<_, InventoryItem>(&sql)
            .bind(store_id)
            .bind(key)
            .fetch_all(&self.pool)
            .await?;

        Ok(items)
    }

    /// Lists the active items of a store, by name.
    pub async fn list_by_store(&self, store_id: &str) -> DbResult<Vec<InventoryItem>> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM inventory_items \
             WHERE store_id = ?1 AND is_active = 1 \
             ORDER BY item_name"
        );
        let items = sqlx::query_as::<_, InventoryItem>(&sql)
            .bind(store_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(items)
    }

    /// Subtracts `amount` if the row is still at `expected_version` and holds
    /// at least `amount`.
    ///
    /// ## Returns
    /// * `Ok(true)` - Applied; stock is now `seen stock - amount`
    /// * `Ok(false)` - Version moved, stock too low, or item not in this store
    pub async fn conditional_subtract(
        &self,
        id: &str,
        store_id: &str,
        amount: Quantity,
        expected_version: i64,
    ) -> DbResult<bool> {
        debug!(id = %id, amount = %amount, expected_version, "Conditional subtract");

        let result = sqlx::query(
            r#"
            UPDATE inventory_items
            SET
                stock_quantity = stock_quantity - ?1,
                version = version + 1,
                updated_at = ?2
            WHERE id = ?3
              AND store_id = ?4
              AND version = ?5
              AND stock_quantity >= ?1
            "#,
        )
        .bind(amount)
        .bind(Utc::now())
        .bind(id)
        .bind(store_id)
        .bind(expected_version)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Adds `amount` back to an item (rollback and reversal).
    ///
    /// ## Returns
    /// `(previous_quantity, new_quantity)` as seen by the update itself.
    pub async fn restore(
        &self,
        id: &str,
        store_id: &str,
        amount: Quantity,
    ) -> DbResult<(Quantity, Quantity)> {
        debug!(id = %id, amount = %amount, "Restoring stock");

        let new_quantity: Option<Quantity> = sqlx::query_scalar(
            r#"
            UPDATE inventory_items
            SET
                stock_quantity = stock_quantity + ?1,
                version = version + 1,
                updated_at = ?2
            WHERE id = ?3 AND store_id = ?4
            RETURNING stock_quantity
            "#,
        )
        .bind(amount)
        .bind(Utc::now())
        .bind(id)
        .bind(store_id)
        .fetch_optional(&self.pool)
        .await?;

        let new_quantity = new_quantity.ok_or_else(|| DbError::not_found("InventoryItem", id))?;
        Ok((new_quantity - amount, new_quantity))
    }

    /// Activates or deactivates an item. Inactive items are invisible to
    /// ingredient lookup but keep their history.
    pub async fn set_active(&self, id: &str, active: bool) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE inventory_items SET is_active = ?1, updated_at = ?2 WHERE id = ?3",
        )
        .bind(active)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("InventoryItem", id));
        }

        Ok(())
    }

    // =========================================================================
    // Movement Log
    // =========================================================================

    /// Appends one movement. The storage trigger rejects movements whose
    /// store does not own the item.
    pub async fn append_movement(&self, movement: &InventoryMovement) -> DbResult<()> {
        debug!(
            transaction_id = %movement.transaction_id,
            item_id = %movement.inventory_item_id,
            change = %movement.quantity_change,
            kind = movement.reference_type.as_str(),
            "Appending movement"
        );

        sqlx::query(
            r#"
            INSERT INTO inventory_movements (
                id, store_id, inventory_item_id,
                quantity_change, previous_quantity, new_quantity,
                reference_type, transaction_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&movement.id)
        .bind(&movement.store_id)
        .bind(&movement.inventory_item_id)
        .bind(movement.quantity_change)
        .bind(movement.previous_quantity)
        .bind(movement.new_quantity)
        .bind(movement.reference_type)
        .bind(&movement.transaction_id)
        .bind(movement.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// All movements of a transaction, oldest first.
    pub async fn movements_for_transaction(
        &self,
        transaction_id: &str,
    ) -> DbResult<Vec<InventoryMovement>> {
        let sql = format!(
            "SELECT {MOVEMENT_COLUMNS} FROM inventory_movements \
             WHERE transaction_id = ?1 \
             ORDER BY created_at, rowid"
        );
        let movements = sqlx::query_as::<_, InventoryMovement>(&sql)
            .bind(transaction_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(movements)
    }

    /// `(transaction_id, store_id)` of every transaction with a deduction
    /// movement written since `since`, in order of its first such movement.
    pub async fn deducted_transactions_since(
        &self,
        store_id: Option<&str>,
        since: DateTime<Utc>,
    ) -> DbResult<Vec<(String, String)>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT transaction_id, store_id
            FROM inventory_movements
            WHERE reference_type = ?1
              AND created_at >= ?2
              AND (?3 IS NULL OR store_id = ?3)
            GROUP BY transaction_id, store_id
            ORDER BY MIN(created_at), MIN(rowid)
            "#,
        )
        .bind(MovementType::Deduction)
        .bind(since)
        .bind(store_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Counts movements of a transaction that touch an item owned by a store
    /// other than the movement's own store or `expected_store`.
    ///
    /// Non-zero only if rows got in past the trigger (restored backups,
    /// manual SQL with triggers disabled).
    pub async fn cross_store_leaks(
        &self,
        transaction_id: &str,
        expected_store: &str,
    ) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM inventory_movements m
            INNER JOIN inventory_items i ON i.id = m.inventory_item_id
            WHERE m.transaction_id = ?1
              AND (i.store_id <> m.store_id OR i.store_id <> ?2)
            "#,
        )
        .bind(transaction_id)
        .bind(expected_store)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
