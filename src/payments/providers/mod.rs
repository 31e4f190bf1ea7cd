pub mod bank_ledger;
pub mod card_gateway;
pub mod sandbox;

pub use bank_ledger::HttpBankLedger;
pub use card_gateway::HttpCardGateway;
pub use sandbox::{OfflineBankLedger, SandboxCardGateway};
