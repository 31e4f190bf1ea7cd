//! Shared fixtures: scripted collaborators and a fully wired engine on the
//! in-memory store.

#![allow(dead_code)]

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use clinic_booking_engine::config::{MerchantConfig, PaymentsConfig};
use clinic_booking_engine::database::memory::InMemoryStore;
use clinic_booking_engine::payments::error::{PaymentError, PaymentResult};
use clinic_booking_engine::payments::factory::PaymentStrategies;
use clinic_booking_engine::payments::provider::{
    BankLedgerClient, CardGatewayClient, ChargeOutcome, LedgerLookup, LedgerTransaction,
    RefundResult,
};
use clinic_booking_engine::payments::types::{CardDetails, MethodParams};
use clinic_booking_engine::services::booking_service::{BookingView, CreateBookingRequest};
use clinic_booking_engine::services::catalog::StaticCatalog;
use clinic_booking_engine::services::notification::{
    NotificationDispatcher, NotificationEvent, Notifier,
};
use clinic_booking_engine::services::{Actor, BookingService, PaymentService};
use clinic_booking_engine::workers::{
    ExpirationSweeper, ExpirationSweeperConfig, ReconciliationPoller, ReconciliationPollerConfig,
};

pub const CUSTOMER: &str = "cust-1";
pub const STAFF: &str = "staff-1";
pub const STI_PANEL: &str = "STI-BASIC";
pub const HIV_RAPID: &str = "HIV-RAPID";
pub const GOOD_CARD: &str = "4242424242424242";
pub const DECLINED_CARD: &str = "4000000000000002";

// ---------------------------------------------------------------------------
// Card gateway
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct ScriptedGateway {
    declines: Mutex<HashMap<String, String>>,
    refund_failure: Mutex<Option<String>>,
    pub charges: AtomicUsize,
    pub refunds: AtomicUsize,
}

impl ScriptedGateway {
    pub fn decline(&self, number: &str, reason: &str) {
        self.declines
            .lock()
            .unwrap()
            .insert(number.to_string(), reason.to_string());
    }

    pub fn fail_refunds(&self, reason: &str) {
        *self.refund_failure.lock().unwrap() = Some(reason.to_string());
    }

    pub fn refund_calls(&self) -> usize {
        self.refunds.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CardGatewayClient for ScriptedGateway {
    async fn charge(
        &self,
        _amount: &BigDecimal,
        _currency: &str,
        card: &CardDetails,
        _idempotency_key: &str,
    ) -> PaymentResult<ChargeOutcome> {
        let n = self.charges.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.declines.lock().unwrap().get(&card.number) {
            return Ok(ChargeOutcome::Declined {
                reason: reason.clone(),
            });
        }
        Ok(ChargeOutcome::Approved {
            transaction_id: format!("ch_test_{}", n + 1),
        })
    }

    async fn refund(&self, transaction_id: &str) -> PaymentResult<RefundResult> {
        self.refunds.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.refund_failure.lock().unwrap().clone() {
            return Ok(RefundResult::Rejected { reason });
        }
        Ok(RefundResult::Refunded {
            refund_id: format!("re_{}", transaction_id),
        })
    }

    fn name(&self) -> &'static str {
        "scripted gateway"
    }
}

// ---------------------------------------------------------------------------
// Bank ledger
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct ScriptedLedger {
    entries: Mutex<HashMap<String, LedgerTransaction>>,
    failing: Mutex<HashSet<String>>,
    pub lookups: AtomicUsize,
}

impl ScriptedLedger {
    /// Books an incoming transfer visible under `reference`.
    pub fn credit(&self, reference: &str, amount: BigDecimal) -> String {
        let transaction_id = format!("FT{}", self.entries.lock().unwrap().len() + 1);
        self.insert(
            reference,
            LedgerTransaction {
                transaction_id: transaction_id.clone(),
                amount,
                reference: reference.to_string(),
                timestamp: Utc::now(),
                successful: true,
            },
        );
        transaction_id
    }

    /// Registers an arbitrary ledger answer for lookups of `reference`.
    pub fn insert(&self, reference: &str, transaction: LedgerTransaction) {
        self.entries
            .lock()
            .unwrap()
            .insert(reference.to_uppercase(), transaction);
    }

    pub fn fail_for(&self, reference: &str) {
        self.failing.lock().unwrap().insert(reference.to_uppercase());
    }

    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BankLedgerClient for ScriptedLedger {
    async fn find_transaction(
        &self,
        reference: &str,
        _expected_amount: &BigDecimal,
    ) -> PaymentResult<LedgerLookup> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let key = reference.to_uppercase();
        if self.failing.lock().unwrap().contains(&key) {
            return Err(PaymentError::ExternalService {
                service: "scripted ledger".to_string(),
                message: "connection reset by peer".to_string(),
                retryable: true,
            });
        }
        Ok(match self.entries.lock().unwrap().get(&key) {
            Some(tx) => LedgerLookup::Found(tx.clone()),
            None => LedgerLookup::NotFound,
        })
    }

    fn name(&self) -> &'static str {
        "scripted ledger"
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingDispatcher {
    events: Mutex<Vec<NotificationEvent>>,
}

impl RecordingDispatcher {
    /// Lets spawned deliveries run, then returns the names seen so far.
    pub async fn names(&self) -> Vec<&'static str> {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        self.events.lock().unwrap().iter().map(|e| e.name()).collect()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn dispatch(&self, event: NotificationEvent) {
        self.events.lock().unwrap().push(event);
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub store: InMemoryStore,
    pub gateway: Arc<ScriptedGateway>,
    pub ledger: Arc<ScriptedLedger>,
    pub notifications: Arc<RecordingDispatcher>,
    pub payments: PaymentService,
    pub bookings: BookingService,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(PaymentsConfig::default())
    }

    /// `qr_expiry_hours = 0` makes every QR payment lapse on creation.
    pub fn with_config(config: PaymentsConfig) -> Self {
        let store = InMemoryStore::new();
        let gateway = Arc::new(ScriptedGateway::default());
        gateway.decline(DECLINED_CARD, "Your card was declined.");
        let ledger = Arc::new(ScriptedLedger::default());
        let notifications = Arc::new(RecordingDispatcher::default());

        let payments = PaymentService::new(
            Arc::new(store.clone()),
            PaymentStrategies::with_config(&config, gateway.clone()),
            MerchantConfig::default(),
            Notifier::new(notifications.clone()),
        );
        let catalog = StaticCatalog::default()
            .with_price(STI_PANEL, BigDecimal::from(500_000))
            .with_price(HIV_RAPID, BigDecimal::from(300_000));
        let bookings = BookingService::new(
            Arc::new(store.clone()),
            payments.clone(),
            Arc::new(catalog),
            config.cancellation_lead_time(),
        );

        Self {
            store,
            gateway,
            ledger,
            notifications,
            payments,
            bookings,
        }
    }

    pub fn poller(&self) -> ReconciliationPoller {
        ReconciliationPoller::new(
            self.payments.clone(),
            self.ledger.clone(),
            ReconciliationPollerConfig::default(),
        )
    }

    pub fn sweeper(&self) -> ExpirationSweeper {
        ExpirationSweeper::new(self.payments.clone(), ExpirationSweeperConfig::default())
    }

    pub async fn book(&self, service_ref: &str, params: MethodParams, hours_ahead: i64) -> BookingView {
        self.bookings
            .create(
                &customer(),
                CreateBookingRequest {
                    customer_ref: CUSTOMER.to_string(),
                    service_ref: service_ref.to_string(),
                    appointment_at: Utc::now() + Duration::hours(hours_ahead),
                    params,
                },
            )
            .await
            .expect("booking should be created")
    }
}

pub fn customer() -> Actor {
    Actor::customer(CUSTOMER)
}

pub fn staff() -> Actor {
    Actor::staff(STAFF)
}

pub fn card(number: &str) -> MethodParams {
    MethodParams::Card {
        card: CardDetails {
            number: number.to_string(),
            exp_month: 12,
            exp_year: 2030,
            cvc: "123".to_string(),
            holder_name: Some("Nguyen Van A".to_string()),
        },
    }
}
