//! Storage contracts for payments and bookings.
//!
//! Every status write is conditional: the store applies the patch only when
//! the stored status still equals `expected`, and returns `None` otherwise.
//! Callers never read-then-write without that guard.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::database::error::DatabaseError;
use crate::payments::types::{PaymentPatch, PaymentRecord, PaymentStatus};
use crate::services::booking_state::{BookingRecord, BookingStatus};

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// Fails with `UniqueViolation` when the QR reference is already taken.
    async fn insert_payment(&self, record: &PaymentRecord) -> Result<PaymentRecord, DatabaseError>;

    async fn find_payment(&self, id: Uuid) -> Result<Option<PaymentRecord>, DatabaseError>;

    async fn find_payment_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<PaymentRecord>, DatabaseError>;

    /// Newest first.
    async fn find_payments_by_owner(
        &self,
        owner_id: &str,
    ) -> Result<Vec<PaymentRecord>, DatabaseError>;

    /// QR payments still `PENDING` whose expiry lies after `now`.
    async fn find_reconcilable(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<PaymentRecord>, DatabaseError>;

    /// `PENDING` payments whose QR expiry is at or before `now`.
    async fn find_expired_pending(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<PaymentRecord>, DatabaseError>;

    /// Applies `patch` only while the record has status `expected` and, when
    /// given, version `expected_version`. `None` means the guard failed.
    async fn update_if_status(
        &self,
        id: Uuid,
        expected: PaymentStatus,
        expected_version: Option<i64>,
        patch: &PaymentPatch,
    ) -> Result<Option<PaymentRecord>, DatabaseError>;

    /// Appends to the audit trail without touching status.
    async fn append_note(&self, id: Uuid, note: &str)
        -> Result<Option<PaymentRecord>, DatabaseError>;
}

#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Persists both records in one transaction; neither is visible on failure.
    async fn create_with_payment(
        &self,
        booking: &BookingRecord,
        payment: &PaymentRecord,
    ) -> Result<(BookingRecord, PaymentRecord), DatabaseError>;

    async fn find_booking(&self, id: Uuid) -> Result<Option<BookingRecord>, DatabaseError>;

    async fn find_booking_by_payment(
        &self,
        payment_id: Uuid,
    ) -> Result<Option<BookingRecord>, DatabaseError>;

    async fn update_booking_status_if(
        &self,
        id: Uuid,
        expected: BookingStatus,
        new_status: BookingStatus,
    ) -> Result<Option<BookingRecord>, DatabaseError>;

    /// Inserts `payment` and points the booking at it, provided the booking is
    /// still `PENDING` and still linked to `expected_payment_id`. Returns `None`
    /// without inserting anything when the guard fails.
    async fn relink_payment(
        &self,
        booking_id: Uuid,
        expected_payment_id: Uuid,
        payment: &PaymentRecord,
    ) -> Result<Option<(BookingRecord, PaymentRecord)>, DatabaseError>;
}
