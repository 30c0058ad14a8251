//! # Deduction Engine
//!
//! Applies a completed sale line to the ledger, all or nothing.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  PENDING ──► RESOLVING ──► VALIDATING ──► APPLYING ──► COMMITTED        │
//! │                  │              │             │                         │
//! │                  │              │             └──► ROLLED_BACK          │
//! │                  └──────────────┴──► FAILED                             │
//! │                                                                         │
//! │  RESOLVING   product → template → effective requirements → store items │
//! │              merged per item, sorted by item id                         │
//! │  VALIDATING  fresh read of every item, Cross-Store Guard, stock check  │
//! │              every faulty ingredient is reported, ledger untouched      │
//! │  APPLYING    per pair, ascending item id:                               │
//! │                UPDATE .. WHERE version = seen AND stock >= qty          │
//! │                lost race → re-read, retry (bounded)                     │
//! │                then append one `deduction` movement                     │
//! │              any failure → restore applied pairs in reverse order,      │
//! │              one `rollback` movement each                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every call that gets past the idempotency check leaves one
//! [`DeductionOutcome`] behind. The health monitor compares those with the
//! movement log.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use larder_core::guard::ensure_same_store;
use larder_core::validation::validate_sale_line;
use larder_core::{
    CoreError, CoreResult, DeductionOutcome, DeductionPair, DeductionResult, DeductionStatus,
    InventoryItem, InventoryMovement, MovementType, OutcomeStatus, Quantity, ResolvedDeduction,
    ReversalSummary, SaleLine, ValidationError, MAX_ITEM_QUANTITY,
};
use larder_db::Database;

use crate::config::DeductionSettings;
use crate::resolve::{load_template, resolve_demands};
use crate::traits::{InventoryLedger, OutcomeLog, RecipeSource};

// =============================================================================
// Line Bookkeeping
// =============================================================================

/// Mutable state of one sale line while it moves through the phases.
struct LineRun {
    transaction_id: String,
    status: DeductionStatus,
    resolved: ResolvedDeduction,
    errors: Vec<String>,
    failed_ingredients: Vec<String>,
    already_applied: bool,
}

impl LineRun {
    fn new(line: &SaleLine) -> Self {
        LineRun {
            transaction_id: line.transaction_id.clone(),
            status: DeductionStatus::Pending,
            resolved: ResolvedDeduction::default(),
            errors: Vec::new(),
            failed_ingredients: Vec::new(),
            already_applied: false,
        }
    }

    fn enter(&mut self, status: DeductionStatus) {
        debug!(from = ?self.status, to = ?status, "Phase transition");
        self.status = status;
    }

    fn push_error(&mut self, err: &CoreError) {
        self.errors.push(err.to_string());
        if let Some(name) = err.ingredient() {
            self.blame(name);
        }
    }

    /// Names an ingredient as one that could not be secured.
    fn blame(&mut self, name: &str) {
        if !self.failed_ingredients.iter().any(|n| n == name) {
            self.failed_ingredients.push(name.to_string());
        }
    }

    fn finish(self) -> DeductionResult {
        DeductionResult {
            transaction_id: self.transaction_id,
            success: self.status == DeductionStatus::Committed,
            status: self.status,
            resolved: self.resolved,
            errors: self.errors,
            failed_ingredients: self.failed_ingredients,
            already_applied: self.already_applied,
        }
    }
}

/// A pair whose subtract and movement both landed.
#[derive(Debug, Clone)]
struct AppliedPair {
    pair: DeductionPair,
}

/// Why a pair could not be applied, and whether it left stock behind.
struct PairFailure {
    error: CoreError,
    /// Set when the pair's own subtract could not be undone.
    stranded: Option<CoreError>,
}

impl From<CoreError> for PairFailure {
    fn from(error: CoreError) -> Self {
        PairFailure {
            error,
            stranded: None,
        }
    }
}

// =============================================================================
// Deduction Engine
// =============================================================================

/// Turns sale lines into ledger decrements.
///
/// Holds no mutable state of its own; every call works from fresh reads, so
/// one engine can serve any number of terminals concurrently.
#[derive(Clone)]
pub struct DeductionEngine {
    recipes: Arc<dyn RecipeSource>,
    ledger: Arc<dyn InventoryLedger>,
    outcomes: Arc<dyn OutcomeLog>,
    settings: DeductionSettings,
}

impl DeductionEngine {
    pub fn new(
        recipes: Arc<dyn RecipeSource>,
        ledger: Arc<dyn InventoryLedger>,
        outcomes: Arc<dyn OutcomeLog>,
        settings: DeductionSettings,
    ) -> Self {
        DeductionEngine {
            recipes,
            ledger,
            outcomes,
            settings,
        }
    }

    /// Engine backed by a SQLite database for all three collaborators.
    pub fn from_database(db: Database, settings: DeductionSettings) -> Self {
        let db = Arc::new(db);
        DeductionEngine::new(db.clone(), db.clone(), db, settings)
    }

    pub fn settings(&self) -> &DeductionSettings {
        &self.settings
    }

    /// Applies one sale line.
    ///
    /// Never panics and never returns `Err`: the outcome, including every
    /// error and the ingredients at fault, is in the [`DeductionResult`].
    ///
    /// ## Guarantees
    /// - `success = true`: every resolved pair was subtracted once and has
    ///   one `deduction` movement
    /// - `success = false`: stock is back where it started; pairs that were
    ///   applied before the failure have a matching `rollback` movement
    /// - a line with an `idempotency_key` that already committed returns
    ///   `already_applied = true` without touching the ledger
    #[instrument(
        skip(self, line),
        fields(
            transaction_id = %line.transaction_id,
            store_id = %line.store_id,
            product_id = %line.product_id,
        )
    )]
    pub async fn apply_deduction(&self, line: &SaleLine) -> DeductionResult {
        let mut run = LineRun::new(line);

        if let Some(key) = line.idempotency_key.as_deref() {
            match self.outcomes.find_committed(key).await {
                Ok(Some(previous)) => {
                    info!(idempotency_key = %key, outcome_id = %previous.id, "Sale line already applied");
                    run.status = DeductionStatus::Committed;
                    run.already_applied = true;
                    return run.finish();
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(idempotency_key = %key, error = %e, "Idempotency lookup failed");
                    run.push_error(&e);
                    run.enter(DeductionStatus::Failed);
                    return run.finish();
                }
            }
        }

        // ---------------------------------------------------------------------
        // RESOLVING
        // ---------------------------------------------------------------------
        run.enter(DeductionStatus::Resolving);
        match self.resolve(line).await {
            Ok(resolved) => run.resolved = resolved,
            Err(errors) => {
                for e in &errors {
                    run.push_error(e);
                }
                warn!(errors = ?run.errors, "Sale line could not be resolved");
                run.enter(DeductionStatus::Failed);
                self.record(line, &run, 0).await;
                return run.finish();
            }
        }

        // ---------------------------------------------------------------------
        // VALIDATING
        // ---------------------------------------------------------------------
        run.enter(DeductionStatus::Validating);
        let snapshots = match self.validate(line, &run.resolved).await {
            Ok(snapshots) => snapshots,
            Err(errors) => {
                for e in &errors {
                    run.push_error(e);
                }
                warn!(
                    failed_ingredients = ?run.failed_ingredients,
                    "Sale line failed validation"
                );
                run.enter(DeductionStatus::Failed);
                self.record(line, &run, 0).await;
                return run.finish();
            }
        };

        // ---------------------------------------------------------------------
        // APPLYING
        // ---------------------------------------------------------------------
        run.enter(DeductionStatus::Applying);
        let pairs = run.resolved.pairs.clone();
        let mut applied: Vec<AppliedPair> = Vec::with_capacity(pairs.len());

        for (pair, snapshot) in pairs.iter().zip(snapshots) {
            match self.apply_pair(line, pair, snapshot).await {
                Ok(done) => applied.push(done),
                Err(failure) => {
                    warn!(
                        item = %pair.item_name,
                        error = %failure.error,
                        applied = applied.len(),
                        "Pair could not be applied, rolling back"
                    );
                    // Storage errors carry no ingredient of their own.
                    run.blame(&pair.item_name);
                    let mut errors = vec![failure.error];
                    errors.extend(failure.stranded);
                    self.abort(line, &mut run, &applied, errors).await;
                    return run.finish();
                }
            }
        }

        run.enter(DeductionStatus::Committed);
        let outcome = self.outcome(line, &run, applied.len() as i64);
        if let Err(e) = self.outcomes.record(&outcome).await {
            // Without its outcome the line would look like an uncompensated
            // partial application, so it does not stand.
            error!(error = %e, "Could not record committed outcome, rolling back");
            for done in &applied {
                run.blame(&done.pair.item_name);
            }
            self.abort(line, &mut run, &applied, vec![e]).await;
            return run.finish();
        }

        info!(pairs = applied.len(), "Sale line committed");
        run.finish()
    }

    /// Voids a committed transaction.
    ///
    /// Sums the transaction's movements per item, restores every item that
    /// is still net negative and writes one `reversal` movement for it, then
    /// marks the transaction's committed outcomes `reversed`. Running it
    /// again restores nothing: the reversal movements already net the items
    /// to zero.
    ///
    /// ## Errors
    /// - `CrossStoreViolation` if any movement of the transaction was
    ///   recorded for a store other than `store_id` (nothing is restored)
    /// - `StorageFailure` from the ledger; items restored before the failure
    ///   keep their reversal movements
    #[instrument(skip(self))]
    pub async fn reverse_transaction(
        &self,
        transaction_id: &str,
        store_id: &str,
    ) -> CoreResult<ReversalSummary> {
        let movements = self.ledger.movements_for_transaction(transaction_id).await?;

        if let Some(foreign) = movements.iter().find(|m| m.store_id != store_id) {
            let item = self.item_name(&foreign.inventory_item_id).await;
            error!(
                item = %item,
                movement_store = %foreign.store_id,
                "Reversal refused: transaction has movements in another store"
            );
            return Err(CoreError::CrossStoreViolation {
                item,
                expected_store: store_id.to_string(),
                actual_store: foreign.store_id.clone(),
            });
        }

        let mut net: BTreeMap<&str, Quantity> = BTreeMap::new();
        for movement in &movements {
            *net.entry(movement.inventory_item_id.as_str()).or_default() +=
                movement.quantity_change;
        }

        let mut restored = Vec::new();
        for (item_id, change) in net.into_iter().rev() {
            if !change.is_negative() {
                continue;
            }
            let amount = -change;
            let (previous, new) = self.ledger.restore(item_id, store_id, amount).await?;

            let reversal = movement(
                store_id,
                item_id,
                transaction_id,
                MovementType::Reversal,
                amount,
                previous,
                new,
            );
            if let Err(e) = self.ledger.append_movement(&reversal).await {
                error!(
                    item_id = %item_id,
                    amount = %amount,
                    error = %e,
                    "Stock restored but reversal movement not written"
                );
                return Err(e);
            }

            let item_name = self.item_name(item_id).await;
            info!(item = %item_name, amount = %amount, "Reversed");
            restored.push(DeductionPair {
                inventory_item_id: item_id.to_string(),
                item_name,
                quantity: amount,
            });
        }

        let outcomes_reversed = self.outcomes.mark_reversed(transaction_id, store_id).await?;

        info!(
            items = restored.len(),
            outcomes = outcomes_reversed,
            "Transaction reversed"
        );

        Ok(ReversalSummary {
            transaction_id: transaction_id.to_string(),
            store_id: store_id.to_string(),
            restored,
            outcomes_reversed: outcomes_reversed as i64,
        })
    }

    // =========================================================================
    // Phases
    // =========================================================================

    /// RESOLVING: sale line → merged, ordered pairs. Pure apart from lookups.
    async fn resolve(&self, line: &SaleLine) -> Result<ResolvedDeduction, Vec<CoreError>> {
        validate_sale_line(line).map_err(|e| vec![CoreError::from(e)])?;

        let template = load_template(self.recipes.as_ref(), &line.product_id)
            .await
            .map_err(|e| vec![e])?;

        let (demands, unresolved) = resolve_demands(
            self.ledger.as_ref(),
            &template,
            &line.selected_choice_ids,
            &line.store_id,
        )
        .await
        .map_err(|e| vec![e])?;

        if !unresolved.is_empty() {
            return Err(unresolved.into_iter().map(|u| u.error).collect());
        }

        let mut pairs = Vec::with_capacity(demands.len());
        for demand in demands {
            let quantity = demand
                .per_unit
                .checked_mul_units(line.quantity_sold)
                .ok_or_else(|| {
                    vec![CoreError::from(ValidationError::OutOfRange {
                        field: "quantity_sold".to_string(),
                        min: 1,
                        max: MAX_ITEM_QUANTITY,
                    })]
                })?;
            pairs.push(DeductionPair {
                inventory_item_id: demand.item.id,
                item_name: demand.item.item_name,
                quantity,
            });
        }

        let resolved = ResolvedDeduction::from_pairs(pairs);
        debug!(pairs = resolved.len(), "Resolved sale line");
        Ok(resolved)
    }

    /// VALIDATING: fresh read per pair. Returns the snapshots in pair order.
    async fn validate(
        &self,
        line: &SaleLine,
        resolved: &ResolvedDeduction,
    ) -> Result<Vec<InventoryItem>, Vec<CoreError>> {
        let mut snapshots = Vec::with_capacity(resolved.len());
        let mut errors = Vec::new();

        for pair in &resolved.pairs {
            let item = match self.ledger.get_item(&pair.inventory_item_id).await {
                Ok(Some(item)) if item.is_active => item,
                Ok(_) => {
                    errors.push(CoreError::MissingIngredient {
                        ingredient: pair.item_name.clone(),
                        store_id: line.store_id.clone(),
                    });
                    continue;
                }
                Err(e) => {
                    errors.push(e);
                    continue;
                }
            };

            if let Err(e) = ensure_same_store(&line.store_id, &item) {
                error!(
                    item = %item.item_name,
                    item_store = %item.store_id,
                    "Cross-store reference rejected"
                );
                errors.push(e);
                continue;
            }

            if item.stock_quantity < pair.quantity {
                errors.push(CoreError::InsufficientStock {
                    item: item.item_name.clone(),
                    needed: pair.quantity,
                    available: item.stock_quantity,
                });
                continue;
            }

            snapshots.push(item);
        }

        if errors.is_empty() {
            Ok(snapshots)
        } else {
            Err(errors)
        }
    }

    /// APPLYING, one pair: bounded optimistic subtract, then its movement.
    async fn apply_pair(
        &self,
        line: &SaleLine,
        pair: &DeductionPair,
        snapshot: InventoryItem,
    ) -> Result<AppliedPair, PairFailure> {
        let max_attempts = self.settings.max_apply_attempts.max(1);
        let mut current = snapshot;

        for attempt in 1..=max_attempts {
            if current.stock_quantity < pair.quantity {
                return Err(CoreError::InsufficientStock {
                    item: pair.item_name.clone(),
                    needed: pair.quantity,
                    available: current.stock_quantity,
                }
                .into());
            }

            let won = self
                .ledger
                .conditional_subtract(
                    &pair.inventory_item_id,
                    &line.store_id,
                    pair.quantity,
                    current.version,
                )
                .await?;

            if won {
                let previous = current.stock_quantity;
                let new = previous - pair.quantity;
                debug!(
                    item = %pair.item_name,
                    quantity = %pair.quantity,
                    previous = %previous,
                    new = %new,
                    attempt,
                    "Subtracted"
                );

                let deduction = movement(
                    &line.store_id,
                    &pair.inventory_item_id,
                    &line.transaction_id,
                    MovementType::Deduction,
                    -pair.quantity,
                    previous,
                    new,
                );
                if let Err(e) = self.ledger.append_movement(&deduction).await {
                    // No movement exists for this subtract, so undo it silently.
                    let stranded = self
                        .ledger
                        .restore(&pair.inventory_item_id, &line.store_id, pair.quantity)
                        .await
                        .err();
                    if let Some(restore_err) = &stranded {
                        error!(
                            item = %pair.item_name,
                            error = %restore_err,
                            "Could not undo subtract after movement failure"
                        );
                    }
                    return Err(PairFailure { error: e, stranded });
                }

                return Ok(AppliedPair { pair: pair.clone() });
            }

            debug!(item = %pair.item_name, attempt, "Lost optimistic race, re-reading");
            current = self
                .ledger
                .get_item(&pair.inventory_item_id)
                .await?
                .ok_or_else(|| CoreError::MissingIngredient {
                    ingredient: pair.item_name.clone(),
                    store_id: line.store_id.clone(),
                })?;
            ensure_same_store(&line.store_id, &current)?;
        }

        Err(CoreError::ConcurrentUpdateConflict {
            item: pair.item_name.clone(),
            attempts: max_attempts,
        }
        .into())
    }

    /// Restores applied pairs in reverse order and records the failure.
    async fn abort(
        &self,
        line: &SaleLine,
        run: &mut LineRun,
        applied: &[AppliedPair],
        errors: Vec<CoreError>,
    ) {
        for e in &errors {
            run.push_error(e);
        }

        let incomplete = self.rollback(line, applied).await;
        if incomplete.is_empty() {
            run.enter(DeductionStatus::RolledBack);
            warn!(restored = applied.len(), "Sale line rolled back");
        } else {
            for e in &incomplete {
                run.errors.push(format!("Rollback incomplete: {}", e));
            }
            run.enter(DeductionStatus::Failed);
            error!(
                failures = incomplete.len(),
                "Rollback incomplete, ledger needs repair"
            );
        }

        self.record(line, run, 0).await;
    }

    /// Compensates applied pairs, newest first. Keeps going past failures and
    /// returns them.
    async fn rollback(&self, line: &SaleLine, applied: &[AppliedPair]) -> Vec<CoreError> {
        let mut failures = Vec::new();

        for done in applied.iter().rev() {
            let pair = &done.pair;
            let (previous, new) = match self
                .ledger
                .restore(&pair.inventory_item_id, &line.store_id, pair.quantity)
                .await
            {
                Ok(quantities) => quantities,
                Err(e) => {
                    error!(item = %pair.item_name, error = %e, "Rollback restore failed");
                    failures.push(e);
                    continue;
                }
            };

            let compensation = movement(
                &line.store_id,
                &pair.inventory_item_id,
                &line.transaction_id,
                MovementType::Rollback,
                pair.quantity,
                previous,
                new,
            );
            if let Err(e) = self.ledger.append_movement(&compensation).await {
                error!(item = %pair.item_name, error = %e, "Rollback movement not written");
                failures.push(e);
                continue;
            }

            debug!(item = %pair.item_name, quantity = %pair.quantity, "Rolled back");
        }

        failures
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn outcome(&self, line: &SaleLine, run: &LineRun, items_processed: i64) -> DeductionOutcome {
        let status = match run.status {
            DeductionStatus::Committed => OutcomeStatus::Committed,
            DeductionStatus::RolledBack => OutcomeStatus::RolledBack,
            _ => OutcomeStatus::Failed,
        };

        DeductionOutcome {
            id: Uuid::new_v4().to_string(),
            transaction_id: line.transaction_id.clone(),
            store_id: line.store_id.clone(),
            product_id: line.product_id.clone(),
            quantity_sold: line.quantity_sold,
            status,
            items_processed,
            idempotency_key: line.idempotency_key.clone(),
            errors: run.errors.clone(),
            created_at: Utc::now(),
        }
    }

    /// Records a non-committed outcome. Failure here is logged only; the
    /// ledger is already consistent.
    async fn record(&self, line: &SaleLine, run: &LineRun, items_processed: i64) {
        let outcome = self.outcome(line, run, items_processed);
        if let Err(e) = self.outcomes.record(&outcome).await {
            warn!(status = outcome.status.as_str(), error = %e, "Could not record outcome");
        }
    }

    async fn item_name(&self, item_id: &str) -> String {
        match self.ledger.get_item(item_id).await {
            Ok(Some(item)) => item.item_name,
            _ => item_id.to_string(),
        }
    }
}

fn movement(
    store_id: &str,
    item_id: &str,
    transaction_id: &str,
    reference_type: MovementType,
    quantity_change: Quantity,
    previous_quantity: Quantity,
    new_quantity: Quantity,
) -> InventoryMovement {
    InventoryMovement {
        id: Uuid::new_v4().to_string(),
        store_id: store_id.to_string(),
        inventory_item_id: item_id.to_string(),
        quantity_change,
        previous_quantity,
        new_quantity,
        reference_type,
        transaction_id: transaction_id.to_string(),
        created_at: Utc::now(),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::availability::AvailabilityChecker;
    use crate::testing::{
        item, mini_croffle_db, q, sale, stock, stock_of, CommitRejectingOutcomes, Fault,
        FaultyLedger, LeakyLedger, STORE_A, STORE_B,
    };

    fn engine(db: &Database) -> DeductionEngine {
        DeductionEngine::from_database(db.clone(), DeductionSettings::default())
    }

    fn faulty_engine(db: &Database, target: &str, fault: Fault) -> DeductionEngine {
        let db_arc = Arc::new(db.clone());
        DeductionEngine::new(
            db_arc.clone(),
            Arc::new(FaultyLedger::new(db.clone(), target, fault)),
            db_arc,
            DeductionSettings::default(),
        )
    }

    async fn net_change(db: &Database, transaction_id: &str) -> Quantity {
        db.inventory()
            .movements_for_transaction(transaction_id)
            .await
            .unwrap()
            .iter()
            .map(|m| m.quantity_change)
            .sum()
    }

    const UNTOUCHED: [(&str, &str); 5] = [
        ("Croissant", "10"),
        ("Whipped Cream", "10"),
        ("Popsicle Stick", "10"),
        ("Choco Flakes", "5"),
        ("Caramel Sauce", "5"),
    ];

    async fn assert_untouched(db: &Database) {
        for (name, expected) in UNTOUCHED {
            assert_eq!(stock(db, STORE_A, name).await, expected, "{name}");
        }
    }

    #[tokio::test]
    async fn test_mini_croffle_with_choco_flakes() {
        let db = mini_croffle_db().await;
        let result = engine(&db).apply_deduction(&sale("txn-1", 1, &["mini-choco"])).await;

        assert!(result.success, "{:?}", result.errors);
        assert_eq!(result.status, DeductionStatus::Committed);
        assert_eq!(result.resolved.len(), 4);

        assert_eq!(stock(&db, STORE_A, "Croissant").await, "9.5");
        assert_eq!(stock(&db, STORE_A, "Whipped Cream").await, "9.5");
        assert_eq!(stock(&db, STORE_A, "Popsicle Stick").await, "9");
        assert_eq!(stock(&db, STORE_A, "Choco Flakes").await, "4.5");
        assert_eq!(stock(&db, STORE_A, "Caramel Sauce").await, "5");
        assert_eq!(stock(&db, STORE_B, "Croissant").await, "10");

        let movements = db.inventory().movements_for_transaction("txn-1").await.unwrap();
        assert_eq!(movements.len(), 4);
        assert!(movements
            .iter()
            .all(|m| m.reference_type == MovementType::Deduction && m.store_id == STORE_A));

        let outcomes = db.outcomes().for_transaction("txn-1").await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].status, OutcomeStatus::Committed);
        assert_eq!(outcomes[0].items_processed, 4);
    }

    #[tokio::test]
    async fn test_short_topping_fails_and_names_it() {
        let db = mini_croffle_db().await;
        stock_of(&db, STORE_A, "Choco Flakes", "0.3").await;

        let result = engine(&db).apply_deduction(&sale("txn-1", 1, &["mini-choco"])).await;

        assert!(!result.success);
        assert_eq!(result.status, DeductionStatus::Failed);
        assert_eq!(result.failed_ingredients, vec!["Choco Flakes".to_string()]);
        assert!(result.errors[0].contains("needed 0.5, available 0.3"));

        assert_eq!(stock(&db, STORE_A, "Choco Flakes").await, "0.3");
        for (name, expected) in &UNTOUCHED[..3] {
            assert_eq!(stock(&db, STORE_A, name).await, *expected);
        }
        assert_eq!(stock(&db, STORE_A, "Caramel Sauce").await, "5");
        assert!(db
            .inventory()
            .movements_for_transaction("txn-1")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_every_short_ingredient_is_reported() {
        let db = mini_croffle_db().await;
        stock_of(&db, STORE_A, "Croissant", "0.2").await;
        stock_of(&db, STORE_A, "Choco Flakes", "0").await;

        let result = engine(&db).apply_deduction(&sale("txn-1", 1, &["mini-choco"])).await;

        assert!(!result.success);
        assert_eq!(result.failed_ingredients.len(), 2);
        assert!(result.failed_ingredients.contains(&"Croissant".to_string()));
        assert!(result.failed_ingredients.contains(&"Choco Flakes".to_string()));
    }

    #[tokio::test]
    async fn test_two_groups_at_half_portion() {
        let db = mini_croffle_db().await;
        // Same product family with a second "sauce" group.
        let mut template = crate::testing::mini_croffle_template();
        template.id = "tmpl-duo".to_string();
        for req in &mut template.ingredients {
            req.id = req.id.replace("mini", "duo");
        }
        template.ingredients[4].choice_group = Some("sauce".to_string());
        db.recipes().insert_template(&template).await.unwrap();
        db.recipes()
            .insert_product(&larder_core::Product {
                id: "duo".to_string(),
                name: "Duo".to_string(),
                recipe_template_id: Some("tmpl-duo".to_string()),
            })
            .await
            .unwrap();

        let mut line = sale("txn-1", 2, &["duo-choco", "duo-caramel"]);
        line.product_id = "duo".to_string();
        let result = engine(&db).apply_deduction(&line).await;

        assert!(result.success, "{:?}", result.errors);
        assert_eq!(result.resolved.len(), 5);
        assert_eq!(stock(&db, STORE_A, "Choco Flakes").await, "4");
        assert_eq!(stock(&db, STORE_A, "Caramel Sauce").await, "4");
        // Bases at full portion regardless of selection
        assert_eq!(stock(&db, STORE_A, "Croissant").await, "9");
        assert_eq!(stock(&db, STORE_A, "Popsicle Stick").await, "8");

        let mut none = sale("txn-2", 1, &[]);
        none.product_id = "duo".to_string();
        let result = engine(&db).apply_deduction(&none).await;
        assert_eq!(result.resolved.len(), 3);
        assert_eq!(stock(&db, STORE_A, "Choco Flakes").await, "4");
    }

    #[tokio::test]
    async fn test_pairs_are_applied_in_item_id_order() {
        let db = mini_croffle_db().await;
        let result = engine(&db).apply_deduction(&sale("txn-1", 1, &["mini-choco"])).await;

        let ids: Vec<_> = result
            .resolved
            .pairs
            .iter()
            .map(|p| p.inventory_item_id.clone())
            .collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);

        let movement_ids: Vec<_> = db
            .inventory()
            .movements_for_transaction("txn-1")
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.inventory_item_id)
            .collect();
        assert_eq!(movement_ids, ids);
    }

    #[tokio::test]
    async fn test_duplicate_targets_are_merged() {
        let db = mini_croffle_db().await;
        let mut template = crate::testing::mini_croffle_template();
        template.id = "tmpl-double".to_string();
        for req in &mut template.ingredients {
            req.id = req.id.replace("mini", "double");
        }
        // Second requirement on the same stock row, spelled differently
        template.ingredients[1].ingredient_name = "  croissant ".to_string();
        db.recipes().insert_template(&template).await.unwrap();
        db.recipes()
            .insert_product(&larder_core::Product {
                id: "double".to_string(),
                name: "Double".to_string(),
                recipe_template_id: Some("tmpl-double".to_string()),
            })
            .await
            .unwrap();

        let mut line = sale("txn-1", 1, &[]);
        line.product_id = "double".to_string();
        let result = engine(&db).apply_deduction(&line).await;

        assert!(result.success, "{:?}", result.errors);
        assert_eq!(result.resolved.len(), 2);
        let croissant = item(&db, STORE_A, "Croissant").await;
        assert_eq!(result.resolved.quantity_for(&croissant.id), Some(q("1")));
        assert_eq!(croissant.stock_quantity, q("9"));
    }

    #[tokio::test]
    async fn test_unknown_product_never_touches_ledger() {
        let db = mini_croffle_db().await;
        let mut line = sale("txn-1", 1, &[]);
        line.product_id = "ghost".to_string();

        let result = engine(&db).apply_deduction(&line).await;

        assert!(!result.success);
        assert_eq!(result.status, DeductionStatus::Failed);
        assert!(result.resolved.is_empty());
        assert!(result.errors[0].contains("ghost"));
        assert_untouched(&db).await;
    }

    #[tokio::test]
    async fn test_unknown_choice_fails_resolution() {
        let db = mini_croffle_db().await;
        let result = engine(&db)
            .apply_deduction(&sale("txn-1", 1, &["mini-sprinkles"]))
            .await;

        assert!(!result.success);
        assert!(result.errors[0].contains("mini-sprinkles"));
        assert_untouched(&db).await;
    }

    #[tokio::test]
    async fn test_invalid_quantity_is_rejected() {
        let db = mini_croffle_db().await;
        let result = engine(&db).apply_deduction(&sale("txn-1", 1000, &[])).await;

        assert!(!result.success);
        assert_eq!(result.status, DeductionStatus::Failed);
        assert_untouched(&db).await;
    }

    #[tokio::test]
    async fn test_ambiguous_ingredient_fails_loudly() {
        let db = mini_croffle_db().await;
        // Same logical name, different spelling: the unique constraint is on
        // the exact name, so both rows exist.
        db.inventory()
            .insert(&larder_db::NewInventoryItem::new(STORE_A, "whipped  cream", q("3")))
            .await
            .unwrap();

        let result = engine(&db).apply_deduction(&sale("txn-1", 1, &[])).await;

        assert!(!result.success);
        assert_eq!(result.failed_ingredients, vec!["Whipped Cream".to_string()]);
        assert!(result.errors[0].contains("matches 2 items"));
        assert_untouched(&db).await;
    }

    #[tokio::test]
    async fn test_in_process_guard_rejects_other_store_rows() {
        let db = mini_croffle_db().await;
        let leaky = DeductionEngine::new(
            Arc::new(db.clone()),
            Arc::new(LeakyLedger {
                inner: db.clone(),
                leak_from: STORE_B.to_string(),
            }),
            Arc::new(db.clone()),
            DeductionSettings::default(),
        );

        let result = leaky.apply_deduction(&sale("txn-1", 1, &[])).await;

        assert!(!result.success);
        assert!(result
            .errors
            .iter()
            .any(|e| e.contains("sale is for store store-a but item belongs to store store-b")));
        assert_eq!(stock(&db, STORE_B, "Croissant").await, "10");
        assert_untouched(&db).await;
    }

    #[tokio::test]
    async fn test_storage_failure_mid_batch_rolls_back() {
        let db = mini_croffle_db().await;
        // Popsicle Stick is applied after some pairs and before others,
        // depending on generated ids; either way nothing may stick.
        let engine = faulty_engine(&db, "Popsicle Stick", Fault::SubtractError);

        let result = engine.apply_deduction(&sale("txn-1", 1, &["mini-choco"])).await;

        assert!(!result.success);
        assert_eq!(result.status, DeductionStatus::RolledBack);
        assert_eq!(result.failed_ingredients, vec!["Popsicle Stick".to_string()]);
        assert!(result.errors[0].contains("injected fault"));
        assert_untouched(&db).await;
        assert_eq!(net_change(&db, "txn-1").await, Quantity::zero());

        let movements = db.inventory().movements_for_transaction("txn-1").await.unwrap();
        let deductions = movements
            .iter()
            .filter(|m| m.reference_type == MovementType::Deduction)
            .count();
        let rollbacks = movements
            .iter()
            .filter(|m| m.reference_type == MovementType::Rollback)
            .count();
        assert_eq!(deductions, rollbacks);

        let outcomes = db.outcomes().for_transaction("txn-1").await.unwrap();
        assert_eq!(outcomes[0].status, OutcomeStatus::RolledBack);
    }

    #[tokio::test]
    async fn test_rollback_runs_in_reverse_application_order() {
        let db = mini_croffle_db().await;
        // Fail the last pair so every other pair is applied first.
        let last = {
            let engine = engine(&db);
            let plan = engine.resolve(&sale("txn-plan", 1, &["mini-choco"])).await.unwrap();
            plan.pairs.last().unwrap().item_name.clone()
        };
        let engine = faulty_engine(&db, &last, Fault::SubtractError);

        engine.apply_deduction(&sale("txn-1", 1, &["mini-choco"])).await;

        let movements = db.inventory().movements_for_transaction("txn-1").await.unwrap();
        let applied: Vec<_> = movements
            .iter()
            .filter(|m| m.reference_type == MovementType::Deduction)
            .map(|m| m.inventory_item_id.clone())
            .collect();
        let mut compensated: Vec<_> = movements
            .iter()
            .filter(|m| m.reference_type == MovementType::Rollback)
            .map(|m| m.inventory_item_id.clone())
            .collect();
        assert_eq!(applied.len(), 3);
        compensated.reverse();
        assert_eq!(applied, compensated);
        assert_untouched(&db).await;
    }

    #[tokio::test]
    async fn test_movement_failure_undoes_its_own_subtract() {
        let db = mini_croffle_db().await;
        let engine = faulty_engine(&db, "Croissant", Fault::AppendError);

        let result = engine.apply_deduction(&sale("txn-1", 1, &["mini-choco"])).await;

        assert_eq!(result.status, DeductionStatus::RolledBack);
        assert_eq!(result.failed_ingredients, vec!["Croissant".to_string()]);
        assert_untouched(&db).await;
        assert_eq!(net_change(&db, "txn-1").await, Quantity::zero());
    }

    #[tokio::test]
    async fn test_unrecorded_commit_is_rolled_back_and_named() {
        let db = mini_croffle_db().await;
        let db_arc = Arc::new(db.clone());
        let engine = DeductionEngine::new(
            db_arc.clone(),
            db_arc,
            Arc::new(CommitRejectingOutcomes { inner: db.clone() }),
            DeductionSettings::default(),
        );

        let result = engine.apply_deduction(&sale("txn-1", 1, &["mini-choco"])).await;

        assert!(!result.success);
        assert_eq!(result.status, DeductionStatus::RolledBack);
        let mut named = result.failed_ingredients.clone();
        named.sort();
        assert_eq!(
            named,
            vec!["Choco Flakes", "Croissant", "Popsicle Stick", "Whipped Cream"]
        );
        assert_untouched(&db).await;
        assert_eq!(net_change(&db, "txn-1").await, Quantity::zero());

        let outcomes = db.outcomes().for_transaction("txn-1").await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].status, OutcomeStatus::RolledBack);
    }

    #[tokio::test]
    async fn test_lost_race_is_retried() {
        let db = mini_croffle_db().await;
        let engine = faulty_engine(&db, "Choco Flakes", Fault::ConcurrentSale(q("1")));

        let result = engine.apply_deduction(&sale("txn-1", 1, &["mini-choco"])).await;

        assert!(result.success, "{:?}", result.errors);
        // 5 - 1 (other terminal) - 0.5
        assert_eq!(stock(&db, STORE_A, "Choco Flakes").await, "3.5");
    }

    #[tokio::test]
    async fn test_lost_race_to_empty_stock_rolls_back() {
        let db = mini_croffle_db().await;
        let engine = faulty_engine(&db, "Choco Flakes", Fault::ConcurrentSale(q("4.8")));

        let result = engine.apply_deduction(&sale("txn-1", 1, &["mini-choco"])).await;

        assert!(!result.success);
        assert_eq!(result.status, DeductionStatus::RolledBack);
        assert_eq!(result.failed_ingredients, vec!["Choco Flakes".to_string()]);
        assert_eq!(stock(&db, STORE_A, "Choco Flakes").await, "0.2");
        for (name, expected) in &UNTOUCHED[..3] {
            assert_eq!(stock(&db, STORE_A, name).await, *expected);
        }
    }

    #[tokio::test]
    async fn test_endless_conflict_gives_up_after_bound() {
        let db = mini_croffle_db().await;
        let ledger = Arc::new(FaultyLedger::new(db.clone(), "Croissant", Fault::AlwaysConflict));
        let engine = DeductionEngine::new(
            Arc::new(db.clone()),
            ledger.clone(),
            Arc::new(db.clone()),
            DeductionSettings {
                max_apply_attempts: 3,
            },
        );

        let result = engine.apply_deduction(&sale("txn-1", 1, &[])).await;

        assert_eq!(result.status, DeductionStatus::RolledBack);
        assert!(result.errors[0].contains("after 3 attempts"));
        assert_eq!(result.failed_ingredients, vec!["Croissant".to_string()]);
        assert_eq!(
            ledger.subtract_calls.load(std::sync::atomic::Ordering::SeqCst),
            3
        );
        assert_untouched(&db).await;
    }

    #[tokio::test]
    async fn test_incomplete_rollback_is_reported() {
        let db = mini_croffle_db().await;
        let plan = engine(&db)
            .resolve(&sale("txn-plan", 1, &["mini-choco"]))
            .await
            .unwrap();
        let first = plan.pairs.first().unwrap().item_name.clone();
        let last = plan.pairs.last().unwrap().item_name.clone();

        // The first pair lands and cannot be restored once the last one fails.
        let ledger = FaultyLedger::new(db.clone(), &first, Fault::RestoreError)
            .and(&last, Fault::SubtractError);
        let engine = DeductionEngine::new(
            Arc::new(db.clone()),
            Arc::new(ledger),
            Arc::new(db.clone()),
            DeductionSettings::default(),
        );

        let result = engine.apply_deduction(&sale("txn-1", 1, &["mini-choco"])).await;

        assert!(!result.success);
        assert_eq!(result.status, DeductionStatus::Failed);
        assert!(result
            .errors
            .iter()
            .any(|e| e.starts_with("Rollback incomplete")));
        assert!(result.failed_ingredients.contains(&last));

        let stranded = item(&db, STORE_A, &first).await;
        let expected = plan.pairs[0].quantity;
        let original = UNTOUCHED
            .iter()
            .find(|(name, _)| *name == first)
            .map(|(_, stock)| q(stock))
            .unwrap();
        assert_eq!(stranded.stock_quantity, original - expected);

        let outcomes = db.outcomes().for_transaction("txn-1").await.unwrap();
        assert_eq!(outcomes[0].status, OutcomeStatus::Failed);
    }

    #[tokio::test]
    async fn test_idempotency_key_applies_once() {
        let db = mini_croffle_db().await;
        let engine = engine(&db);
        let mut line = sale("txn-1", 1, &["mini-choco"]);
        line.idempotency_key = Some("terminal-1:txn-1:line-1".to_string());

        let first = engine.apply_deduction(&line).await;
        assert!(first.success);
        assert!(!first.already_applied);

        let second = engine.apply_deduction(&line).await;
        assert!(second.success);
        assert!(second.already_applied);

        assert_eq!(stock(&db, STORE_A, "Choco Flakes").await, "4.5");
        assert_eq!(
            db.inventory()
                .movements_for_transaction("txn-1")
                .await
                .unwrap()
                .len(),
            4
        );
    }

    #[tokio::test]
    async fn test_failed_attempt_does_not_claim_idempotency_key() {
        let db = mini_croffle_db().await;
        stock_of(&db, STORE_A, "Choco Flakes", "0").await;
        let engine = engine(&db);
        let mut line = sale("txn-1", 1, &["mini-choco"]);
        line.idempotency_key = Some("key-1".to_string());

        assert!(!engine.apply_deduction(&line).await.success);

        stock_of(&db, STORE_A, "Choco Flakes", "1").await;
        let retry = engine.apply_deduction(&line).await;
        assert!(retry.success);
        assert!(!retry.already_applied);
        assert_eq!(stock(&db, STORE_A, "Choco Flakes").await, "0.5");
    }

    #[tokio::test]
    async fn test_availability_ceiling_holds() {
        let db = mini_croffle_db().await;
        let checker = AvailabilityChecker::from_database(db.clone());
        let engine = engine(&db);
        let choices = vec!["mini-choco".to_string()];

        let availability = checker
            .check_availability("mini-croffle", 1, &choices, STORE_A)
            .await;
        let max = availability.max_quantity;
        assert_eq!(max, 10);

        let at_max = checker
            .check_availability("mini-croffle", max, &choices, STORE_A)
            .await;
        assert!(at_max.can_make);

        assert!(engine
            .apply_deduction(&sale("txn-1", max, &["mini-choco"]))
            .await
            .success);
        assert_eq!(stock(&db, STORE_A, "Popsicle Stick").await, "0");
        assert_eq!(stock(&db, STORE_A, "Choco Flakes").await, "0");

        let after = checker
            .check_availability("mini-croffle", 1, &choices, STORE_A)
            .await;
        assert!(!after.can_make);
        assert_eq!(after.max_quantity, 0);
    }

    #[tokio::test]
    async fn test_concurrent_terminals_never_oversell() {
        let db = mini_croffle_db().await;
        stock_of(&db, STORE_A, "Choco Flakes", "2").await;
        let engine = engine(&db);

        let mut tasks = Vec::new();
        for i in 0..6 {
            let engine = engine.clone();
            tasks.push(tokio::spawn(async move {
                engine
                    .apply_deduction(&sale(&format!("txn-{i}"), 1, &["mini-choco"]))
                    .await
            }));
        }

        let mut committed = 0;
        for task in tasks {
            if task.await.unwrap().success {
                committed += 1;
            }
        }

        // 2 / 0.5 = 4 at most
        assert!(committed <= 4);
        let choco = item(&db, STORE_A, "Choco Flakes").await;
        assert!(!choco.stock_quantity.is_negative());
        assert_eq!(
            choco.stock_quantity,
            q("2") - Quantity::from_thousandths(500) * committed
        );
    }

    #[tokio::test]
    async fn test_reverse_transaction_restores_stock() {
        let db = mini_croffle_db().await;
        let engine = engine(&db);
        assert!(engine
            .apply_deduction(&sale("txn-1", 2, &["mini-choco"]))
            .await
            .success);
        assert_eq!(stock(&db, STORE_A, "Croissant").await, "9");

        let summary = engine.reverse_transaction("txn-1", STORE_A).await.unwrap();

        assert_eq!(summary.restored.len(), 4);
        assert_eq!(summary.outcomes_reversed, 1);
        assert_untouched(&db).await;
        assert_eq!(net_change(&db, "txn-1").await, Quantity::zero());

        let outcomes = db.outcomes().for_transaction("txn-1").await.unwrap();
        assert_eq!(outcomes[0].status, OutcomeStatus::Reversed);

        // Second run finds nothing left to restore
        let again = engine.reverse_transaction("txn-1", STORE_A).await.unwrap();
        assert!(again.restored.is_empty());
        assert_eq!(again.outcomes_reversed, 0);
        assert_untouched(&db).await;
    }

    #[tokio::test]
    async fn test_reverse_from_wrong_store_is_refused() {
        let db = mini_croffle_db().await;
        let engine = engine(&db);
        assert!(engine.apply_deduction(&sale("txn-1", 1, &[])).await.success);

        let err = engine.reverse_transaction("txn-1", STORE_B).await.unwrap_err();

        assert!(matches!(err, CoreError::CrossStoreViolation { .. }));
        assert_eq!(stock(&db, STORE_A, "Croissant").await, "9.5");
        assert_eq!(stock(&db, STORE_B, "Croissant").await, "10");
    }
}
