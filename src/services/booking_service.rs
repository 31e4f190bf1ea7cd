//! Booking workflow gated on payment state.
//!
//! A booking is created together with its payment record and can only be
//! confirmed once that payment has settled (or is cash on delivery). Every
//! status write is conditional on the status the caller observed.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::database::error::DatabaseError;
use crate::database::repository::BookingRepository;
use crate::payments::error::PaymentError;
use crate::payments::types::{
    InitiatedPayment, MethodParams, PaymentInstructions, PaymentMethod, PaymentRecord,
    PaymentRequest, PaymentStatus,
};
use crate::services::booking_state::{BookingRecord, BookingStatus};
use crate::services::catalog::BookingCatalog;
use crate::services::notification::NotificationEvent;
use crate::services::payment_service::{insert_with_rekey, PaymentService};
use crate::services::refund_dispatcher::{RefundDispatcher, RefundOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorRole {
    Customer,
    Staff,
}

impl FromStr for ActorRole {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "customer" => Ok(ActorRole::Customer),
            "staff" => Ok(ActorRole::Staff),
            other => Err(format!("unknown actor role: {}", other)),
        }
    }
}

/// Whoever is calling. Identity is taken at face value here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub role: ActorRole,
}

impl Actor {
    pub fn customer(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: ActorRole::Customer,
        }
    }

    pub fn staff(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: ActorRole::Staff,
        }
    }

    pub fn is_staff(&self) -> bool {
        self.role == ActorRole::Staff
    }

    fn may_act_for(&self, owner: &str) -> bool {
        self.is_staff() || self.id == owner
    }
}

#[derive(Debug, Error)]
pub enum BookingError {
    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error("Payment {payment_id} is {status}, booking cannot be confirmed yet")]
    PaymentNotSettled {
        payment_id: Uuid,
        status: PaymentStatus,
    },

    /// Always a logic or race bug on the caller's side.
    #[error("Invalid booking transition from {current} to {requested}")]
    InvalidTransition {
        current: BookingStatus,
        requested: BookingStatus,
    },

    #[error("Appointment at {appointment_at} is within the {lead_time_hours}h cancellation window")]
    CancellationWindowClosed {
        appointment_at: DateTime<Utc>,
        lead_time_hours: i64,
    },

    #[error("Forbidden: {reason}")]
    Forbidden { reason: String },

    #[error("Booking not found: {booking_id}")]
    NotFound { booking_id: Uuid },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

pub type BookingResult<T> = Result<T, BookingError>;

impl From<BookingError> for crate::error::AppError {
    fn from(err: BookingError) -> Self {
        use crate::error::{AppError, AppErrorKind, DomainError};

        let kind = match err {
            BookingError::Payment(e) => return AppError::from(e),
            BookingError::Database(e) => return AppError::from(e),
            BookingError::PaymentNotSettled { payment_id, status } => {
                DomainError::PaymentNotSettled {
                    payment_id: payment_id.to_string(),
                    status: status.to_string(),
                }
            }
            BookingError::InvalidTransition { current, requested } => {
                DomainError::InvalidTransition {
                    entity: "Booking".to_string(),
                    current: current.to_string(),
                    requested: requested.to_string(),
                }
            }
            BookingError::CancellationWindowClosed {
                appointment_at,
                lead_time_hours,
            } => DomainError::CancellationWindowClosed {
                appointment_at: appointment_at.to_rfc3339(),
                lead_time_hours,
            },
            BookingError::Forbidden { reason } => DomainError::Forbidden { reason },
            BookingError::NotFound { booking_id } => DomainError::NotFound {
                entity: "Booking".to_string(),
                id: booking_id.to_string(),
            },
        };
        AppError::new(AppErrorKind::Domain(kind))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateBookingRequest {
    pub customer_ref: String,
    pub service_ref: String,
    pub appointment_at: DateTime<Utc>,
    #[serde(flatten)]
    pub params: MethodParams,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingView {
    pub booking: BookingRecord,
    pub payment: PaymentRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<PaymentInstructions>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CanceledBooking {
    pub booking: BookingRecord,
    pub refund: RefundOutcome,
}

#[derive(Clone)]
pub struct BookingService {
    bookings: Arc<dyn BookingRepository>,
    payments: PaymentService,
    refunds: RefundDispatcher,
    catalog: Arc<dyn BookingCatalog>,
    lead_time: ChronoDuration,
}

impl BookingService {
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        payments: PaymentService,
        catalog: Arc<dyn BookingCatalog>,
        lead_time: ChronoDuration,
    ) -> Self {
        Self {
            bookings,
            refunds: RefundDispatcher::new(payments.clone()),
            payments,
            catalog,
            lead_time,
        }
    }

    /// Creates the booking and its payment in one transaction, then runs the
    /// payment's synchronous confirmation step.
    pub async fn create(
        &self,
        actor: &Actor,
        request: CreateBookingRequest,
    ) -> BookingResult<BookingView> {
        let customer_ref = request.customer_ref.trim().to_string();
        if !actor.may_act_for(&customer_ref) {
            return Err(BookingError::Forbidden {
                reason: "customers can only book for themselves".to_string(),
            });
        }

        let now = Utc::now();
        if request.appointment_at <= now {
            return Err(PaymentError::Validation {
                message: "appointment must be in the future".to_string(),
                field: Some("appointment_at".to_string()),
            }
            .into());
        }

        let service_ref = request.service_ref.trim().to_string();
        let amount =
            self.catalog
                .price_of(&service_ref)
                .await
                .ok_or_else(|| PaymentError::Validation {
                    message: format!("unknown service: {}", service_ref),
                    field: Some("service_ref".to_string()),
                })?;

        let payment_request = PaymentRequest {
            owner_id: customer_ref.clone(),
            service_ref: service_ref.clone(),
            amount,
            params: request.params,
        };
        let (strategy, record) = self.payments.prepare(&payment_request)?;
        let booking = BookingRecord::new(
            customer_ref,
            service_ref,
            record.id,
            request.appointment_at,
            now,
        );

        let repo = self.bookings.clone();
        let (booking, payment) = insert_with_rekey(strategy.as_ref(), record, move |record| {
            let repo = repo.clone();
            let booking = booking.clone();
            async move { repo.create_with_payment(&booking, &record).await }
        })
        .await?;

        info!(
            booking_id = %booking.id,
            payment_id = %payment.id,
            method = %payment.method,
            status = %payment.status,
            appointment_at = %booking.appointment_at,
            "Booking created"
        );

        let payment = self.payments.settle(payment, &payment_request.params).await?;
        Ok(self.view(booking, payment))
    }

    pub async fn get(&self, actor: &Actor, booking_id: Uuid) -> BookingResult<BookingView> {
        let booking = self.load(booking_id).await?;
        self.authorize(actor, &booking)?;
        let payment = self.payments.get(booking.payment_record_id).await?;
        Ok(self.view(booking, payment))
    }

    /// `PENDING → CONFIRMED`. Staff only; requires a settled payment.
    pub async fn confirm(&self, actor: &Actor, booking_id: Uuid) -> BookingResult<BookingRecord> {
        require_staff(actor, "only staff can confirm bookings")?;
        let booking = self.load(booking_id).await?;
        if booking.status != BookingStatus::Pending {
            return Err(self.invalid(&booking, BookingStatus::Confirmed));
        }

        let payment = self.payments.get(booking.payment_record_id).await?;
        let settled =
            payment.method == PaymentMethod::Cod || payment.status == PaymentStatus::Completed;
        if !settled {
            info!(
                booking_id = %booking.id,
                payment_id = %payment.id,
                status = %payment.status,
                "Confirmation refused, payment not settled"
            );
            return Err(BookingError::PaymentNotSettled {
                payment_id: payment.id,
                status: payment.status,
            });
        }

        let confirmed = self
            .transition(&booking, BookingStatus::Confirmed)
            .await?;
        self.payments
            .notifier()
            .notify(NotificationEvent::BookingConfirmed {
                booking_id: confirmed.id,
                customer_ref: confirmed.customer_ref.clone(),
            });
        Ok(confirmed)
    }

    /// `CONFIRMED → SAMPLED → RESULTED → COMPLETED`, one step at a time.
    /// Staff only; payment is not re-checked.
    pub async fn advance(
        &self,
        actor: &Actor,
        booking_id: Uuid,
        to: BookingStatus,
    ) -> BookingResult<BookingRecord> {
        require_staff(actor, "only staff can advance bookings")?;
        let booking = self.load(booking_id).await?;
        if !matches!(
            to,
            BookingStatus::Sampled | BookingStatus::Resulted | BookingStatus::Completed
        ) || !booking.status.can_transition_to(to)
        {
            return Err(self.invalid(&booking, to));
        }
        self.transition(&booking, to).await
    }

    /// Single entry point for status changes requested over the API.
    pub async fn change_status(
        &self,
        actor: &Actor,
        booking_id: Uuid,
        to: BookingStatus,
        reason: Option<&str>,
    ) -> BookingResult<BookingRecord> {
        match to {
            BookingStatus::Confirmed => self.confirm(actor, booking_id).await,
            BookingStatus::Canceled => Ok(self
                .cancel(actor, booking_id, reason.unwrap_or("canceled"))
                .await?
                .booking),
            other => self.advance(actor, booking_id, other).await,
        }
    }

    /// Cancels a `PENDING` or `CONFIRMED` booking outside the lead-time window
    /// and refunds a completed payment. A failed refund never blocks the
    /// cancellation.
    pub async fn cancel(
        &self,
        actor: &Actor,
        booking_id: Uuid,
        reason: &str,
    ) -> BookingResult<CanceledBooking> {
        let booking = self.load(booking_id).await?;
        self.authorize(actor, &booking)?;
        if !booking.status.can_transition_to(BookingStatus::Canceled) {
            return Err(self.invalid(&booking, BookingStatus::Canceled));
        }
        if booking.appointment_at - Utc::now() < self.lead_time {
            return Err(BookingError::CancellationWindowClosed {
                appointment_at: booking.appointment_at,
                lead_time_hours: self.lead_time.num_hours(),
            });
        }

        let canceled = self.transition(&booking, BookingStatus::Canceled).await?;
        let reason = format!("Booking canceled by {} {}: {}", role_label(actor), actor.id, reason);

        let refund = match self.payments.get(canceled.payment_record_id).await {
            Ok(payment) => match self.refunds.dispatch(&payment, &reason).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(booking_id = %canceled.id, error = %e, "Refund dispatch errored");
                    RefundOutcome::Failed {
                        reason: e.to_string(),
                    }
                }
            },
            Err(e) => {
                error!(booking_id = %canceled.id, error = %e, "Linked payment could not be loaded");
                RefundOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        info!(
            booking_id = %canceled.id,
            refund = refund.label(),
            "Booking canceled"
        );
        self.payments
            .notifier()
            .notify(NotificationEvent::BookingCanceled {
                booking_id: canceled.id,
                customer_ref: canceled.customer_ref.clone(),
                refund: refund.label().to_string(),
            });

        Ok(CanceledBooking {
            booking: canceled,
            refund,
        })
    }

    /// Regenerates a QR payment.
    ///
    /// A `PENDING` record gets a new reference and expiry in place. An
    /// `EXPIRED` record is left as audit and replaced by a new `PENDING`
    /// record, which the booking (if any, and only while `PENDING`) is relinked to.
    pub async fn regenerate_qr(
        &self,
        actor: &Actor,
        payment_id: Uuid,
    ) -> BookingResult<InitiatedPayment> {
        let payment = self.payments.get(payment_id).await?;
        if !actor.may_act_for(&payment.owner_id) {
            return Err(BookingError::Forbidden {
                reason: "payment belongs to another customer".to_string(),
            });
        }
        if payment.method != PaymentMethod::Qr {
            return Err(PaymentError::Validation {
                message: "only QR payments can be regenerated".to_string(),
                field: Some("payment_id".to_string()),
            }
            .into());
        }

        match payment.status {
            PaymentStatus::Pending => {
                let refreshed = self.payments.refresh_qr(&payment).await?;
                Ok(self.payments.present(refreshed))
            }
            PaymentStatus::Expired => {
                let request = PaymentRequest {
                    owner_id: payment.owner_id.clone(),
                    service_ref: payment.service_ref.clone(),
                    amount: payment.amount.clone(),
                    params: MethodParams::Qr,
                };
                match self.bookings.find_booking_by_payment(payment.id).await? {
                    None => Ok(self.payments.initiate(request).await?),
                    Some(booking) => {
                        if booking.status != BookingStatus::Pending {
                            return Err(self.invalid(&booking, BookingStatus::Pending));
                        }
                        let (_, replacement) =
                            self.replace_payment(&booking, &payment, &request).await?;
                        Ok(self.payments.present(replacement))
                    }
                }
            }
            current => {
                error!(
                    payment_id = %payment.id,
                    current = %current,
                    "QR regeneration requested for a settled payment"
                );
                Err(PaymentError::InvalidTransition {
                    current,
                    requested: PaymentStatus::Pending,
                }
                .into())
            }
        }
    }

    /// Starts a new payment attempt for a `PENDING` booking whose current
    /// payment failed or expired. The old record is kept as audit.
    pub async fn retry_payment(
        &self,
        actor: &Actor,
        booking_id: Uuid,
        params: MethodParams,
    ) -> BookingResult<BookingView> {
        let booking = self.load(booking_id).await?;
        self.authorize(actor, &booking)?;
        if booking.status != BookingStatus::Pending {
            return Err(self.invalid(&booking, BookingStatus::Pending));
        }

        let current = self.payments.get(booking.payment_record_id).await?;
        if !matches!(current.status, PaymentStatus::Failed | PaymentStatus::Expired) {
            return Err(PaymentError::InvalidTransition {
                current: current.status,
                requested: PaymentStatus::Pending,
            }
            .into());
        }

        let request = PaymentRequest {
            owner_id: booking.customer_ref.clone(),
            service_ref: booking.service_ref.clone(),
            amount: current.amount.clone(),
            params,
        };
        let (booking, replacement) = self.replace_payment(&booking, &current, &request).await?;
        let payment = self.payments.settle(replacement, &request.params).await?;
        Ok(self.view(booking, payment))
    }

    async fn replace_payment(
        &self,
        booking: &BookingRecord,
        previous: &PaymentRecord,
        request: &PaymentRequest,
    ) -> BookingResult<(BookingRecord, PaymentRecord)> {
        let (strategy, record) = self.payments.prepare(request)?;
        let repo = self.bookings.clone();
        let (booking_id, previous_id) = (booking.id, previous.id);
        let relinked = insert_with_rekey(strategy.as_ref(), record, move |record| {
            let repo = repo.clone();
            async move { repo.relink_payment(booking_id, previous_id, &record).await }
        })
        .await?;

        match relinked {
            Some((booking, payment)) => {
                info!(
                    booking_id = %booking.id,
                    previous_payment_id = %previous_id,
                    payment_id = %payment.id,
                    method = %payment.method,
                    "Booking relinked to new payment"
                );
                Ok((booking, payment))
            }
            None => {
                let current = self.load(booking_id).await?;
                warn!(
                    booking_id = %current.id,
                    status = %current.status,
                    linked_payment_id = %current.payment_record_id,
                    "Booking changed before the new payment could be linked"
                );
                if current.status != BookingStatus::Pending {
                    return Err(self.invalid(&current, BookingStatus::Pending));
                }
                Err(PaymentError::InvalidTransition {
                    current: previous.status,
                    requested: PaymentStatus::Pending,
                }
                .into())
            }
        }
    }

    async fn transition(
        &self,
        booking: &BookingRecord,
        to: BookingStatus,
    ) -> BookingResult<BookingRecord> {
        match self
            .bookings
            .update_booking_status_if(booking.id, booking.status, to)
            .await?
        {
            Some(updated) => {
                info!(
                    booking_id = %updated.id,
                    from = %booking.status,
                    status = %updated.status,
                    "Booking status updated"
                );
                Ok(updated)
            }
            None => {
                let current = self.load(booking.id).await?;
                Err(self.invalid(&current, to))
            }
        }
    }

    async fn load(&self, booking_id: Uuid) -> BookingResult<BookingRecord> {
        self.bookings
            .find_booking(booking_id)
            .await?
            .ok_or(BookingError::NotFound { booking_id })
    }

    fn authorize(&self, actor: &Actor, booking: &BookingRecord) -> BookingResult<()> {
        if actor.may_act_for(&booking.customer_ref) {
            Ok(())
        } else {
            Err(BookingError::Forbidden {
                reason: "booking belongs to another customer".to_string(),
            })
        }
    }

    fn invalid(&self, booking: &BookingRecord, requested: BookingStatus) -> BookingError {
        error!(
            booking_id = %booking.id,
            current = %booking.status,
            requested = %requested,
            "Invalid booking transition"
        );
        BookingError::InvalidTransition {
            current: booking.status,
            requested,
        }
    }

    fn view(&self, booking: BookingRecord, payment: PaymentRecord) -> BookingView {
        let InitiatedPayment {
            record,
            instructions,
        } = self.payments.present(payment);
        BookingView {
            booking,
            payment: record,
            instructions,
        }
    }
}

fn require_staff(actor: &Actor, reason: &str) -> BookingResult<()> {
    if actor.is_staff() {
        Ok(())
    } else {
        Err(BookingError::Forbidden {
            reason: reason.to_string(),
        })
    }
}

fn role_label(actor: &Actor) -> &'static str {
    match actor.role {
        ActorRole::Customer => "customer",
        ActorRole::Staff => "staff",
    }
}
