use crate::payments::error::PaymentError;
use crate::payments::provider::{BankLedgerClient, LedgerLookup};
use crate::payments::types::PaymentRecord;
use crate::payments::utils::with_timeout;
use crate::services::payment_service::PaymentService;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ReconciliationPollerConfig {
    pub enabled: bool,
    /// How often the worker wakes up to query the bank ledger.
    pub poll_interval: Duration,
    /// Maximum number of pending QR payments checked per cycle.
    pub batch_size: i64,
    /// Ledger lookups in flight at once.
    pub concurrency: usize,
    /// Upper bound on a single ledger lookup.
    pub ledger_timeout: Duration,
}

impl Default for ReconciliationPollerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval: Duration::from_secs(120),
            batch_size: 200,
            concurrency: 4,
            ledger_timeout: Duration::from_secs(15),
        }
    }
}

impl ReconciliationPollerConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.enabled = std::env::var("RECONCILIATION_ENABLED")
            .ok()
            .and_then(|v| v.parse::<bool>().ok())
            .unwrap_or(cfg.enabled);
        cfg.poll_interval = Duration::from_secs(
            std::env::var("RECONCILIATION_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(cfg.poll_interval.as_secs()),
        );
        cfg.batch_size = std::env::var("RECONCILIATION_BATCH_SIZE")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(cfg.batch_size);
        cfg.concurrency = std::env::var("RECONCILIATION_CONCURRENCY")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(cfg.concurrency);
        cfg.ledger_timeout = Duration::from_secs(
            std::env::var("EXTERNAL_CALL_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(cfg.ledger_timeout.as_secs()),
        );
        cfg
    }
}

// ---------------------------------------------------------------------------
// Cycle bookkeeping
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleStats {
    pub checked: usize,
    pub completed: usize,
    pub unmatched: usize,
    /// Ledger returned a transaction whose amount or reference did not match.
    pub rejected: usize,
    /// Match found but the record had already left `PENDING`.
    pub dropped: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordOutcome {
    Completed,
    Unmatched,
    Rejected,
    Dropped,
    Errored,
}

impl CycleStats {
    fn record(&mut self, outcome: RecordOutcome) {
        self.checked += 1;
        match outcome {
            RecordOutcome::Completed => self.completed += 1,
            RecordOutcome::Unmatched => self.unmatched += 1,
            RecordOutcome::Rejected => self.rejected += 1,
            RecordOutcome::Dropped => self.dropped += 1,
            RecordOutcome::Errored => self.errors += 1,
        }
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// Matches pending QR payments against the bank ledger.
///
/// Safe to run on overlapping schedules or on several instances: a match is
/// only written while the record is still `PENDING`.
pub struct ReconciliationPoller {
    payments: PaymentService,
    ledger: Arc<dyn BankLedgerClient>,
    config: ReconciliationPollerConfig,
}

impl ReconciliationPoller {
    pub fn new(
        payments: PaymentService,
        ledger: Arc<dyn BankLedgerClient>,
        config: ReconciliationPollerConfig,
    ) -> Self {
        Self {
            payments,
            ledger,
            config,
        }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            batch_size = self.config.batch_size,
            concurrency = self.config.concurrency,
            ledger = self.ledger.name(),
            "QR reconciliation poller started"
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("QR reconciliation poller stopping");
                        break;
                    }
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {
                    match self.run_cycle().await {
                        Ok(stats) if stats.checked > 0 => {
                            info!(
                                checked = stats.checked,
                                completed = stats.completed,
                                unmatched = stats.unmatched,
                                rejected = stats.rejected,
                                dropped = stats.dropped,
                                errors = stats.errors,
                                "reconciliation cycle finished"
                            );
                        }
                        Ok(_) => debug!("no pending QR payments to reconcile"),
                        Err(e) => warn!(error = %e, "reconciliation cycle failed"),
                    }
                }
            }
        }

        info!("QR reconciliation poller stopped");
    }

    /// One pass over the pending QR payments. Per-record failures are logged
    /// and counted; only failing to load the batch aborts the cycle.
    pub async fn run_cycle(&self) -> anyhow::Result<CycleStats> {
        let pending = self.payments.reconcilable(self.config.batch_size).await?;

        let outcomes: Vec<RecordOutcome> = stream::iter(pending)
            .map(|record| self.reconcile(record))
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        let mut stats = CycleStats::default();
        for outcome in outcomes {
            stats.record(outcome);
        }
        Ok(stats)
    }

    async fn reconcile(&self, record: PaymentRecord) -> RecordOutcome {
        match self.try_reconcile(&record).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    payment_id = %record.id,
                    qr_reference = ?record.qr_reference,
                    error = %e,
                    "ledger check failed, will retry next cycle"
                );
                RecordOutcome::Errored
            }
        }
    }

    async fn try_reconcile(&self, record: &PaymentRecord) -> Result<RecordOutcome, PaymentError> {
        let Some(reference) = record.qr_reference.as_deref() else {
            warn!(payment_id = %record.id, "pending QR payment has no reference");
            return Ok(RecordOutcome::Unmatched);
        };

        let lookup = with_timeout(
            self.ledger.name(),
            self.config.ledger_timeout,
            self.ledger.find_transaction(reference, &record.amount),
        )
        .await?;

        let transaction = match lookup {
            LedgerLookup::NotFound => return Ok(RecordOutcome::Unmatched),
            LedgerLookup::Found(transaction) => transaction,
        };

        if !transaction.matches(reference, &record.amount) {
            warn!(
                payment_id = %record.id,
                qr_reference = %reference,
                expected_amount = %record.amount,
                ledger_amount = %transaction.amount,
                ledger_reference = %transaction.reference,
                ledger_transaction_id = %transaction.transaction_id,
                "ledger transaction does not match exactly, ignored"
            );
            return Ok(RecordOutcome::Rejected);
        }

        match self.payments.apply_ledger_match(record, &transaction).await? {
            Some(updated) => {
                info!(
                    payment_id = %updated.id,
                    qr_reference = %reference,
                    transaction_id = %transaction.transaction_id,
                    "QR payment reconciled"
                );
                Ok(RecordOutcome::Completed)
            }
            None => Ok(RecordOutcome::Dropped),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_count_every_outcome() {
        let mut stats = CycleStats::default();
        for outcome in [
            RecordOutcome::Completed,
            RecordOutcome::Unmatched,
            RecordOutcome::Errored,
            RecordOutcome::Dropped,
        ] {
            stats.record(outcome);
        }
        assert_eq!(stats.checked, 4);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.rejected, 0);
    }

    #[test]
    fn default_interval_is_two_minutes() {
        let cfg = ReconciliationPollerConfig::default();
        assert_eq!(cfg.poll_interval, Duration::from_secs(120));
        assert!(cfg.enabled);
    }
}
