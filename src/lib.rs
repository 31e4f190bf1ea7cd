//! Clinic booking engine
//!
//! Payment lifecycle and booking workflow for a clinic that accepts cash on
//! delivery, card charges through an external gateway, and bank-transfer QR
//! payments that are reconciled against the bank ledger in the background.

pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod health;
pub mod logging;
pub mod middleware;
pub mod payments;
pub mod services;
pub mod workers;
