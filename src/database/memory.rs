use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::database::error::DatabaseError;
use crate::database::repository::{BookingRepository, PaymentRepository};
use crate::payments::types::{PaymentMethod, PaymentPatch, PaymentRecord, PaymentStatus};
use crate::services::booking_state::{BookingRecord, BookingStatus};

const QR_REFERENCE_CONSTRAINT: &str = "payment_records_qr_reference_key";

#[derive(Default)]
struct Tables {
    payments: HashMap<Uuid, PaymentRecord>,
    references: HashMap<String, Uuid>,
    bookings: HashMap<Uuid, BookingRecord>,
}

impl Tables {
    fn check_reference_free(&self, record: &PaymentRecord) -> Result<(), DatabaseError> {
        if let Some(reference) = &record.qr_reference {
            if self.references.contains_key(reference) {
                return Err(DatabaseError::unique_violation(QR_REFERENCE_CONSTRAINT));
            }
        }
        Ok(())
    }

    fn insert_payment(&mut self, record: &PaymentRecord) {
        if let Some(reference) = &record.qr_reference {
            self.references.insert(reference.clone(), record.id);
        }
        self.payments.insert(record.id, record.clone());
    }
}

/// Thread-safe in-memory store for payments and bookings.
///
/// One lock covers both tables so that booking creation and payment relinking
/// are atomic, and every conditional write is checked under the write lock.
/// Used by `SKIP_EXTERNALS` runs and by the test suite.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn payment_count(&self) -> usize {
        self.tables.read().await.payments.len()
    }

    pub async fn booking_count(&self) -> usize {
        self.tables.read().await.bookings.len()
    }
}

#[async_trait]
impl PaymentRepository for InMemoryStore {
    async fn insert_payment(&self, record: &PaymentRecord) -> Result<PaymentRecord, DatabaseError> {
        let mut tables = self.tables.write().await;
        tables.check_reference_free(record)?;
        tables.insert_payment(record);
        Ok(record.clone())
    }

    async fn find_payment(&self, id: Uuid) -> Result<Option<PaymentRecord>, DatabaseError> {
        Ok(self.tables.read().await.payments.get(&id).cloned())
    }

    async fn find_payment_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<PaymentRecord>, DatabaseError> {
        let tables = self.tables.read().await;
        Ok(tables
            .references
            .get(reference)
            .and_then(|id| tables.payments.get(id))
            .cloned())
    }

    async fn find_payments_by_owner(
        &self,
        owner_id: &str,
    ) -> Result<Vec<PaymentRecord>, DatabaseError> {
        let tables = self.tables.read().await;
        let mut records: Vec<PaymentRecord> = tables
            .payments
            .values()
            .filter(|p| p.owner_id == owner_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    async fn find_reconcilable(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<PaymentRecord>, DatabaseError> {
        let tables = self.tables.read().await;
        let mut records: Vec<PaymentRecord> = tables
            .payments
            .values()
            .filter(|p| {
                p.method == PaymentMethod::Qr
                    && p.status == PaymentStatus::Pending
                    && p.qr_expires_at.map(|at| at > now).unwrap_or(false)
            })
            .cloned()
            .collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        records.truncate(limit.max(0) as usize);
        Ok(records)
    }

    async fn find_expired_pending(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<PaymentRecord>, DatabaseError> {
        let tables = self.tables.read().await;
        let mut records: Vec<PaymentRecord> = tables
            .payments
            .values()
            .filter(|p| p.status == PaymentStatus::Pending && p.is_qr_expired_at(now))
            .cloned()
            .collect();
        records.sort_by(|a, b| a.qr_expires_at.cmp(&b.qr_expires_at));
        records.truncate(limit.max(0) as usize);
        Ok(records)
    }

    async fn update_if_status(
        &self,
        id: Uuid,
        expected: PaymentStatus,
        expected_version: Option<i64>,
        patch: &PaymentPatch,
    ) -> Result<Option<PaymentRecord>, DatabaseError> {
        let mut tables = self.tables.write().await;
        let old_reference = match tables.payments.get(&id) {
            Some(current)
                if current.status == expected
                    && expected_version.map_or(true, |v| current.version == v) =>
            {
                current.qr_reference.clone()
            }
            _ => return Ok(None),
        };

        if let Some(new_reference) = &patch.qr_reference {
            if old_reference.as_deref() != Some(new_reference.as_str())
                && tables.references.contains_key(new_reference)
            {
                return Err(DatabaseError::unique_violation(QR_REFERENCE_CONSTRAINT));
            }
        }

        let Some(record) = tables.payments.get_mut(&id) else {
            return Ok(None);
        };
        patch.apply_to(record, Utc::now());
        let updated = record.clone();

        if let Some(new_reference) = &patch.qr_reference {
            if let Some(old) = old_reference {
                tables.references.remove(&old);
            }
            tables.references.insert(new_reference.clone(), id);
        }
        Ok(Some(updated))
    }

    async fn append_note(
        &self,
        id: Uuid,
        note: &str,
    ) -> Result<Option<PaymentRecord>, DatabaseError> {
        let mut tables = self.tables.write().await;
        Ok(tables.payments.get_mut(&id).map(|record| {
            record.notes.push(note.to_string());
            record.version += 1;
            record.updated_at = Utc::now();
            record.clone()
        }))
    }
}

#[async_trait]
impl BookingRepository for InMemoryStore {
    async fn create_with_payment(
        &self,
        booking: &BookingRecord,
        payment: &PaymentRecord,
    ) -> Result<(BookingRecord, PaymentRecord), DatabaseError> {
        let mut tables = self.tables.write().await;
        tables.check_reference_free(payment)?;
        tables.insert_payment(payment);
        tables.bookings.insert(booking.id, booking.clone());
        Ok((booking.clone(), payment.clone()))
    }

    async fn find_booking(&self, id: Uuid) -> Result<Option<BookingRecord>, DatabaseError> {
        Ok(self.tables.read().await.bookings.get(&id).cloned())
    }

    async fn find_booking_by_payment(
        &self,
        payment_id: Uuid,
    ) -> Result<Option<BookingRecord>, DatabaseError> {
        let tables = self.tables.read().await;
        Ok(tables
            .bookings
            .values()
            .find(|b| b.payment_record_id == payment_id)
            .cloned())
    }

    async fn update_booking_status_if(
        &self,
        id: Uuid,
        expected: BookingStatus,
        new_status: BookingStatus,
    ) -> Result<Option<BookingRecord>, DatabaseError> {
        let mut tables = self.tables.write().await;
        Ok(match tables.bookings.get_mut(&id) {
            Some(booking) if booking.status == expected => {
                booking.status = new_status;
                booking.updated_at = Utc::now();
                Some(booking.clone())
            }
            _ => None,
        })
    }

    async fn relink_payment(
        &self,
        booking_id: Uuid,
        expected_payment_id: Uuid,
        payment: &PaymentRecord,
    ) -> Result<Option<(BookingRecord, PaymentRecord)>, DatabaseError> {
        let mut tables = self.tables.write().await;
        match tables.bookings.get(&booking_id) {
            Some(b)
                if b.status == BookingStatus::Pending
                    && b.payment_record_id == expected_payment_id => {}
            _ => return Ok(None),
        }
        tables.check_reference_free(payment)?;
        tables.insert_payment(payment);

        let Some(booking) = tables.bookings.get_mut(&booking_id) else {
            return Ok(None);
        };
        booking.payment_record_id = payment.id;
        booking.updated_at = Utc::now();
        Ok(Some((booking.clone(), payment.clone())))
    }
}
