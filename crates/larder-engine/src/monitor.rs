//! # Health Monitor
//!
//! Out-of-band reconciliation of the engine's outcome log against the
//! movement log. Reads only; repair is [`DeductionEngine::reverse_transaction`]
//! and is always triggered by a person.
//!
//! ## Monitor Loop
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Health Monitor                                  │
//! │                                                                         │
//! │  every interval_secs:                                                   │
//! │                                                                         │
//! │  deduction_outcomes + deduction movements (last window_minutes)         │
//! │        │ group by (transaction_id, store_id)                            │
//! │        ▼                                                                │
//! │  inventory_movements of the transaction ──► net change, counts          │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  ┌───────────┬──────────────────────────────────────────────────────┐  │
//! │  │ critical  │ false success, cross-store leak, residual movement   │  │
//! │  │ warning   │ rolled back / failed line, movement count mismatch   │  │
//! │  │ healthy   │ otherwise                                            │  │
//! │  └───────────┴──────────────────────────────────────────────────────┘  │
//! │        │ non-healthy, new or escalated since the last alert             │
//! │        ▼                                                                │
//! │  mpsc::Sender<HealthAlert> + log                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`DeductionEngine::reverse_transaction`]: crate::deduction::DeductionEngine::reverse_transaction

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, instrument, warn};

use larder_core::{
    CoreResult, DeductionOutcome, HealthAlert, HealthClassification, HealthStatus, MovementType,
    OutcomeStatus, Quantity, StockReport,
};
use larder_db::Database;

use crate::config::MonitorSettings;
use crate::error::{EngineError, EngineResult};
use crate::traits::{InventoryLedger, OutcomeLog};

// =============================================================================
// Health Monitor
// =============================================================================

/// Classifies recent transactions and reports stock levels.
#[derive(Clone)]
pub struct HealthMonitor {
    ledger: Arc<dyn InventoryLedger>,
    outcomes: Arc<dyn OutcomeLog>,
}

/// Handle for stopping a running monitor loop.
#[derive(Clone)]
pub struct MonitorHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl MonitorHandle {
    /// Creates a handle and the receiver to pass to [`HealthMonitor::run`].
    pub fn new() -> (Self, mpsc::Receiver<()>) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        (MonitorHandle { shutdown_tx }, shutdown_rx)
    }

    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) -> EngineResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| EngineError::ChannelError("Shutdown channel closed".into()))
    }
}

/// Highest classification alerted per `(transaction_id, store_id)`.
///
/// Only transactions the last sweep still saw as non-healthy are kept, so the
/// map never outgrows the monitor window.
#[derive(Debug, Default)]
pub struct RaisedAlerts {
    highest: HashMap<(String, String), HealthClassification>,
}

impl RaisedAlerts {
    pub fn len(&self) -> usize {
        self.highest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.highest.is_empty()
    }

    /// Drops transactions that left the window or became healthy.
    fn retain_current(&mut self, statuses: &[HealthStatus]) {
        self.highest.retain(|(transaction_id, store_id), _| {
            statuses.iter().any(|s| {
                s.transaction_id == *transaction_id
                    && s.store_id == *store_id
                    && s.classification != HealthClassification::Healthy
            })
        });
    }

    /// Records `status` and says whether it deserves an alert.
    fn escalates(&mut self, status: &HealthStatus) -> bool {
        if status.classification == HealthClassification::Healthy {
            return false;
        }
        let key = (status.transaction_id.clone(), status.store_id.clone());
        match self.highest.get(&key) {
            Some(previous) if *previous >= status.classification => false,
            _ => {
                self.highest.insert(key, status.classification);
                true
            }
        }
    }
}

impl HealthMonitor {
    pub fn new(ledger: Arc<dyn InventoryLedger>, outcomes: Arc<dyn OutcomeLog>) -> Self {
        HealthMonitor { ledger, outcomes }
    }

    /// Monitor backed by a SQLite database.
    pub fn from_database(db: Database) -> Self {
        let db = Arc::new(db);
        HealthMonitor::new(db.clone(), db)
    }

    /// Classifies every transaction with an outcome or a deduction movement
    /// recorded in the last `window`, optionally for one store only.
    ///
    /// Statuses come back in the order their transactions first appear in
    /// the outcome log, followed by transactions known only from the
    /// movement log.
    ///
    /// ## Errors
    /// - `StorageFailure` if the outcome or movement log cannot be read
    #[instrument(skip(self))]
    pub async fn check_health(
        &self,
        store_id: Option<&str>,
        window: Duration,
    ) -> CoreResult<Vec<HealthStatus>> {
        let since = window_start(window);
        let outcomes = self.outcomes.recent(store_id, since).await?;

        let mut groups: Vec<((String, String), Vec<DeductionOutcome>)> = Vec::new();
        for outcome in outcomes {
            let key = (outcome.transaction_id.clone(), outcome.store_id.clone());
            match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, group)) => group.push(outcome),
                None => groups.push((key, vec![outcome])),
            }
        }

        // A line that died between its subtracts and its outcome leaves
        // deduction movements and nothing in the outcome log.
        for key in self.ledger.deducted_transactions_since(store_id, since).await? {
            if !groups.iter().any(|(k, _)| *k == key) {
                groups.push((key, Vec::new()));
            }
        }

        let mut statuses = Vec::with_capacity(groups.len());
        for ((transaction_id, store_id), group) in groups {
            statuses.push(self.classify(&transaction_id, &store_id, &group).await?);
        }

        debug!(
            checked = statuses.len(),
            critical = statuses
                .iter()
                .filter(|s| s.classification == HealthClassification::Critical)
                .count(),
            "Health check complete"
        );

        Ok(statuses)
    }

    /// Counts a store's active items and lists those at or under their
    /// threshold. Items with nothing left are listed as out of stock only.
    pub async fn stock_report(&self, store_id: &str) -> CoreResult<StockReport> {
        let items = self.ledger.list_items(store_id).await?;

        let active_items = items.len() as i64;
        let (out_of_stock, rest): (Vec<_>, Vec<_>) =
            items.into_iter().partition(|item| item.is_out_of_stock());
        let low_stock = rest.into_iter().filter(|item| item.is_low_stock()).collect();

        Ok(StockReport {
            store_id: store_id.to_string(),
            active_items,
            low_stock,
            out_of_stock,
        })
    }

    /// One monitor pass: checks health and returns alerts for transactions
    /// that are new to `raised` or worse than when last alerted.
    pub async fn sweep(
        &self,
        store_id: Option<&str>,
        window: Duration,
        raised: &mut RaisedAlerts,
    ) -> CoreResult<Vec<HealthAlert>> {
        let statuses = self.check_health(store_id, window).await?;
        raised.retain_current(&statuses);

        let alerts = statuses
            .into_iter()
            .filter(|s| raised.escalates(s))
            .map(|s| HealthAlert {
                transaction_id: s.transaction_id,
                store_id: s.store_id,
                classification: s.classification,
                message: s.message,
                raised_at: Utc::now(),
            })
            .collect();

        Ok(alerts)
    }

    /// Runs the monitor loop until `shutdown_rx` fires.
    ///
    /// This should be spawned as a background task. The first check runs
    /// immediately. Alerts that do not fit in the channel are logged and
    /// dropped; the loop never waits on a slow consumer.
    pub async fn run(
        self,
        settings: MonitorSettings,
        alerts: mpsc::Sender<HealthAlert>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        info!(
            interval_secs = settings.interval_secs,
            window_minutes = settings.window_minutes,
            store_id = ?settings.store_id,
            "Health monitor starting"
        );

        let mut interval = tokio::time::interval(settings.interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut raised = RaisedAlerts::default();

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let found = match self
                        .sweep(settings.store_id.as_deref(), settings.window(), &mut raised)
                        .await
                    {
                        Ok(found) => found,
                        Err(e) => {
                            error!(error = %e, "Health check failed");
                            continue;
                        }
                    };

                    for alert in found {
                        log_alert(&alert);
                        match alerts.try_send(alert) {
                            Ok(()) => {}
                            Err(TrySendError::Full(alert)) => {
                                warn!(transaction_id = %alert.transaction_id, "Alert channel full, alert dropped");
                            }
                            Err(TrySendError::Closed(alert)) => {
                                warn!(transaction_id = %alert.transaction_id, "Alert channel closed, alert dropped");
                            }
                        }
                    }
                }

                _ = shutdown_rx.recv() => {
                    info!("Health monitor shutting down");
                    break;
                }
            }
        }

        info!("Health monitor stopped");
    }

    // =========================================================================
    // Classification
    // =========================================================================

    async fn classify(
        &self,
        transaction_id: &str,
        store_id: &str,
        outcomes: &[DeductionOutcome],
    ) -> CoreResult<HealthStatus> {
        let movements: Vec<_> = self
            .ledger
            .movements_for_transaction(transaction_id)
            .await?
            .into_iter()
            .filter(|m| m.store_id == store_id)
            .collect();
        let leaks = self.ledger.cross_store_leaks(transaction_id, store_id).await?;

        let net_change: Quantity = movements.iter().map(|m| m.quantity_change).sum();
        let deductions = movements
            .iter()
            .filter(|m| m.reference_type == MovementType::Deduction)
            .count() as i64;

        let committed: Vec<_> = outcomes
            .iter()
            .filter(|o| o.status == OutcomeStatus::Committed)
            .collect();
        let items_processed: i64 = committed.iter().map(|o| o.items_processed).sum();
        let unsuccessful = outcomes
            .iter()
            .filter(|o| matches!(o.status, OutcomeStatus::RolledBack | OutcomeStatus::Failed))
            .count();

        let false_success = items_processed > 0 && net_change.is_zero();
        let residual = committed.is_empty() && !net_change.is_zero();

        let mut findings = Vec::new();
        if false_success {
            findings.push(format!(
                "reported {} items processed but the ledger shows no net change",
                items_processed
            ));
        }
        if leaks > 0 {
            findings.push(format!("{} movements touch items of another store", leaks));
        }
        if residual {
            findings.push(format!(
                "net change {} left behind without a committed outcome",
                net_change
            ));
        }

        let classification = if !findings.is_empty() {
            HealthClassification::Critical
        } else {
            if unsuccessful > 0 {
                findings.push(format!("{} sale lines rolled back or failed", unsuccessful));
            }
            if !committed.is_empty() && deductions != items_processed {
                findings.push(format!(
                    "{} deduction movements for {} items processed",
                    deductions, items_processed
                ));
            }
            if findings.is_empty() {
                HealthClassification::Healthy
            } else {
                HealthClassification::Warning
            }
        };

        let message = if findings.is_empty() {
            "ok".to_string()
        } else {
            findings.join("; ")
        };

        Ok(HealthStatus {
            transaction_id: transaction_id.to_string(),
            store_id: store_id.to_string(),
            classification,
            false_success,
            cross_store_leaks: leaks,
            movement_count: movements.len() as i64,
            net_change,
            items_processed,
            message,
        })
    }
}

fn window_start(window: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(window)
        .ok()
        .and_then(|window| Utc::now().checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn log_alert(alert: &HealthAlert) {
    match alert.classification {
        HealthClassification::Critical => error!(
            transaction_id = %alert.transaction_id,
            store_id = %alert.store_id,
            message = %alert.message,
            "Critical ledger inconsistency"
        ),
        _ => warn!(
            transaction_id = %alert.transaction_id,
            store_id = %alert.store_id,
            message = %alert.message,
            "Ledger warning"
        ),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
