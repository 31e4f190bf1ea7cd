use crate::services::payment_service::PaymentService;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct ExpirationSweeperConfig {
    pub enabled: bool,
    pub sweep_interval: Duration,
    /// Maximum number of lapsed payments expired per cycle.
    pub batch_size: i64,
}

impl Default for ExpirationSweeperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sweep_interval: Duration::from_secs(300),
            batch_size: 500,
        }
    }
}

impl ExpirationSweeperConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.enabled = std::env::var("EXPIRATION_SWEEP_ENABLED")
            .ok()
            .and_then(|v| v.parse::<bool>().ok())
            .unwrap_or(cfg.enabled);
        cfg.sweep_interval = Duration::from_secs(
            std::env::var("EXPIRATION_SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(cfg.sweep_interval.as_secs()),
        );
        cfg.batch_size = std::env::var("EXPIRATION_SWEEP_BATCH_SIZE")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(cfg.batch_size);
        cfg
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub scanned: usize,
    pub expired: usize,
    /// Already confirmed (or otherwise moved on) by the time of the write.
    pub skipped: usize,
    pub errors: usize,
}

/// Expires QR payments whose lifetime ran out without a matching transfer.
/// Bookings are left alone; cancellation stays a customer or staff action.
pub struct ExpirationSweeper {
    payments: PaymentService,
    config: ExpirationSweeperConfig,
}

impl ExpirationSweeper {
    pub fn new(payments: PaymentService, config: ExpirationSweeperConfig) -> Self {
        Self { payments, config }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            sweep_interval_secs = self.config.sweep_interval.as_secs(),
            batch_size = self.config.batch_size,
            "QR expiration sweeper started"
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("QR expiration sweeper stopping");
                        break;
                    }
                }
                _ = tokio::time::sleep(self.config.sweep_interval) => {
                    match self.run_cycle().await {
                        Ok(stats) if stats.scanned > 0 => info!(
                            scanned = stats.scanned,
                            expired = stats.expired,
                            skipped = stats.skipped,
                            errors = stats.errors,
                            "expiration sweep finished"
                        ),
                        Ok(_) => debug!("no lapsed QR payments"),
                        Err(e) => warn!(error = %e, "expiration sweep failed"),
                    }
                }
            }
        }

        info!("QR expiration sweeper stopped");
    }

    pub async fn run_cycle(&self) -> anyhow::Result<SweepStats> {
        let lapsed = self.payments.lapsed(self.config.batch_size).await?;
        let mut stats = SweepStats {
            scanned: lapsed.len(),
            ..SweepStats::default()
        };

        for record in &lapsed {
            match self.payments.expire(record).await {
                Ok(Some(_)) => {
                    info!(
                        payment_id = %record.id,
                        qr_reference = ?record.qr_reference,
                        "QR payment expired"
                    );
                    stats.expired += 1;
                }
                Ok(None) => stats.skipped += 1,
                Err(e) => {
                    warn!(payment_id = %record.id, error = %e, "failed to expire payment");
                    stats.errors += 1;
                }
            }
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_interval_is_five_minutes() {
        let cfg = ExpirationSweeperConfig::default();
        assert_eq!(cfg.sweep_interval, Duration::from_secs(300));
        assert_eq!(cfg.batch_size, 500);
    }
}
