use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::database::payment_repository::insert_payment_with;
use crate::database::repository::BookingRepository;
use crate::payments::types::PaymentRecord;
use crate::services::booking_state::{BookingRecord, BookingStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use uuid::Uuid;

const BOOKING_COLUMNS: &str =
    "id, customer_ref, service_ref, payment_record_id, status, appointment_at, created_at, updated_at";

#[derive(Debug, Clone, FromRow)]
struct BookingRow {
    id: Uuid,
    customer_ref: String,
    service_ref: String,
    payment_record_id: Uuid,
    status: String,
    appointment_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for BookingRecord {
    type Error = DatabaseError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let status = BookingStatus::from_str(&row.status).map_err(|message| {
            DatabaseError::new(DatabaseErrorKind::Unknown {
                message: format!("{} on booking {}", message, row.id),
            })
        })?;
        Ok(BookingRecord {
            id: row.id,
            customer_ref: row.customer_ref,
            service_ref: row.service_ref,
            payment_record_id: row.payment_record_id,
            status,
            appointment_at: row.appointment_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Postgres-backed booking store; payment rows written here share its transaction.
pub struct PgBookingRepository {
    pool: PgPool,
}

impl PgBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookingRepository for PgBookingRepository {
    async fn create_with_payment(
        &self,
        booking: &BookingRecord,
        payment: &PaymentRecord,
    ) -> Result<(BookingRecord, PaymentRecord), DatabaseError> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        let payment = insert_payment_with(&mut *tx, payment).await?;

        let sql = format!(
            "INSERT INTO booking_records ({BOOKING_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {BOOKING_COLUMNS}"
        );
        let row = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(booking.id)
            .bind(&booking.customer_ref)
            .bind(&booking.service_ref)
            .bind(payment.id)
            .bind(booking.status.as_str())
            .bind(booking.appointment_at)
            .bind(booking.created_at)
            .bind(booking.updated_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        tx.commit().await.map_err(DatabaseError::from_sqlx)?;
        Ok((BookingRecord::try_from(row)?, payment))
    }

    async fn find_booking(&self, id: Uuid) -> Result<Option<BookingRecord>, DatabaseError> {
        let sql = format!("SELECT {BOOKING_COLUMNS} FROM booking_records WHERE id = $1");
        sqlx::query_as::<_, BookingRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?
            .map(BookingRecord::try_from)
            .transpose()
    }

    async fn find_booking_by_payment(
        &self,
        payment_id: Uuid,
    ) -> Result<Option<BookingRecord>, DatabaseError> {
        let sql = format!(
            "SELECT {BOOKING_COLUMNS} FROM booking_records WHERE payment_record_id = $1 LIMIT 1"
        );
        sqlx::query_as::<_, BookingRow>(&sql)
            .bind(payment_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?
            .map(BookingRecord::try_from)
            .transpose()
    }

    async fn update_booking_status_if(
        &self,
        id: Uuid,
        expected: BookingStatus,
        new_status: BookingStatus,
    ) -> Result<Option<BookingRecord>, DatabaseError> {
        let sql = format!(
            "UPDATE booking_records SET status = $3, updated_at = NOW() \
             WHERE id = $1 AND status = $2 \
             RETURNING {BOOKING_COLUMNS}"
        );
        sqlx::query_as::<_, BookingRow>(&sql)
            .bind(id)
            .bind(expected.as_str())
            .bind(new_status.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?
            .map(BookingRecord::try_from)
            .transpose()
    }

    async fn relink_payment(
        &self,
        booking_id: Uuid,
        expected_payment_id: Uuid,
        payment: &PaymentRecord,
    ) -> Result<Option<(BookingRecord, PaymentRecord)>, DatabaseError> {
        let mut tx = self.pool.begin().await.map_err(DatabaseError::from_sqlx)?;

        // Lock the booking row so the guard and the relink see the same state.
        let locked: Option<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM booking_records \
             WHERE id = $1 AND payment_record_id = $2 AND status = 'PENDING' \
             FOR UPDATE",
        )
        .bind(booking_id)
        .bind(expected_payment_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        if locked.is_none() {
            tx.rollback().await.map_err(DatabaseError::from_sqlx)?;
            return Ok(None);
        }

        let payment = insert_payment_with(&mut *tx, payment).await?;

        let sql = format!(
            "UPDATE booking_records SET payment_record_id = $2, updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {BOOKING_COLUMNS}"
        );
        let row = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(booking_id)
            .bind(payment.id)
            .fetch_one(&mut *tx)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        tx.commit().await.map_err(DatabaseError::from_sqlx)?;
        Ok(Some((BookingRecord::try_from(row)?, payment)))
    }
}
