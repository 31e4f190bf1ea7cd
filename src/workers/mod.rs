pub mod expiration_sweeper;
pub mod reconciliation_poller;

pub use expiration_sweeper::{ExpirationSweeper, ExpirationSweeperConfig};
pub use reconciliation_poller::{ReconciliationPoller, ReconciliationPollerConfig};
