//! End-to-end booking flows on the in-memory store.

mod common;

use bigdecimal::BigDecimal;
use clinic_booking_engine::config::PaymentsConfig;
use clinic_booking_engine::payments::error::PaymentError;
use clinic_booking_engine::payments::types::{MethodParams, PaymentMethod, PaymentStatus};
use clinic_booking_engine::services::booking_state::BookingStatus;
use clinic_booking_engine::services::{BookingError, RefundOutcome};
use common::*;

#[tokio::test]
async fn cod_booking_is_paid_and_confirmable_immediately() {
    let h = Harness::new();
    let view = h.book(STI_PANEL, MethodParams::Cod, 72).await;

    assert_eq!(view.payment.method, PaymentMethod::Cod);
    assert_eq!(view.payment.status, PaymentStatus::Completed);
    assert_eq!(view.payment.amount, BigDecimal::from(500_000));
    assert!(view.payment.paid_at.is_some());
    assert!(view.instructions.is_none());

    let confirmed = h.bookings.confirm(&staff(), view.booking.id).await.unwrap();
    assert_eq!(confirmed.status, BookingStatus::Confirmed);
    assert!(h.notifications.names().await.contains(&"booking_confirmed"));
}

#[tokio::test]
async fn qr_booking_becomes_confirmable_after_reconciliation() {
    let h = Harness::new();
    let view = h.book(HIV_RAPID, MethodParams::Qr, 72).await;
    assert_eq!(view.payment.status, PaymentStatus::Pending);
    assert_eq!(view.payment.amount, BigDecimal::from(300_000));
    let reference = view.payment.qr_reference.clone().unwrap();
    assert_eq!(view.instructions.as_ref().unwrap().reference, reference);

    let err = h.bookings.confirm(&staff(), view.booking.id).await.unwrap_err();
    assert!(matches!(
        err,
        BookingError::PaymentNotSettled {
            status: PaymentStatus::Pending,
            ..
        }
    ));

    let tx_id = h.ledger.credit(&reference, BigDecimal::from(300_000));
    let stats = h.poller().run_cycle().await.unwrap();
    assert_eq!(stats.completed, 1);

    let payment = h.payments.get(view.payment.id).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Completed);
    assert_eq!(payment.external_transaction_id.as_deref(), Some(tx_id.as_str()));
    assert!(payment.paid_at.is_some());
    assert!(payment
        .notes
        .iter()
        .any(|n| n.contains("source=bank-reconciliation")));

    let confirmed = h.bookings.confirm(&staff(), view.booking.id).await.unwrap();
    assert_eq!(confirmed.status, BookingStatus::Confirmed);
}

#[tokio::test]
async fn lapsed_qr_payment_expires_but_booking_stays_pending() {
    let h = Harness::with_config(PaymentsConfig {
        qr_expiry_hours: 0,
        ..PaymentsConfig::default()
    });
    let view = h.book(HIV_RAPID, MethodParams::Qr, 72).await;

    // Past expiry the poller no longer looks at it.
    let poll = h.poller().run_cycle().await.unwrap();
    assert_eq!(poll.checked, 0);

    let sweep = h.sweeper().run_cycle().await.unwrap();
    assert_eq!(sweep.expired, 1);

    let payment = h.payments.get(view.payment.id).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Expired);
    let booking = h.bookings.get(&customer(), view.booking.id).await.unwrap();
    assert_eq!(booking.booking.status, BookingStatus::Pending);
    assert!(h.notifications.names().await.contains(&"payment_expired"));
}

#[tokio::test]
async fn declined_card_is_failed_and_retry_creates_a_new_record() {
    let h = Harness::new();
    let view = h.book(STI_PANEL, card(DECLINED_CARD), 72).await;
    assert_eq!(view.payment.status, PaymentStatus::Failed);
    assert_eq!(
        view.payment.failure_reason.as_deref(),
        Some("Your card was declined.")
    );
    assert!(view
        .payment
        .notes
        .iter()
        .any(|n| n.contains("Your card was declined.")));

    let err = h.bookings.confirm(&staff(), view.booking.id).await.unwrap_err();
    assert!(matches!(
        err,
        BookingError::PaymentNotSettled {
            status: PaymentStatus::Failed,
            ..
        }
    ));

    let retried = h
        .bookings
        .retry_payment(&customer(), view.booking.id, card(GOOD_CARD))
        .await
        .unwrap();
    assert_ne!(retried.payment.id, view.payment.id);
    assert_eq!(retried.payment.status, PaymentStatus::Completed);
    assert_eq!(retried.booking.payment_record_id, retried.payment.id);
    assert_eq!(h.store.payment_count().await, 2);

    let old = h.payments.get(view.payment.id).await.unwrap();
    assert_eq!(old.status, PaymentStatus::Failed);

    h.bookings.confirm(&staff(), view.booking.id).await.unwrap();
}

#[tokio::test]
async fn retry_is_refused_while_payment_is_still_pending() {
    let h = Harness::new();
    let view = h.book(HIV_RAPID, MethodParams::Qr, 72).await;
    let err = h
        .bookings
        .retry_payment(&customer(), view.booking.id, MethodParams::Cod)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BookingError::Payment(PaymentError::InvalidTransition {
            current: PaymentStatus::Pending,
            ..
        })
    ));
    assert_eq!(h.store.payment_count().await, 1);
}

#[tokio::test]
async fn confirmed_card_booking_canceled_early_is_refunded() {
    let h = Harness::new();
    let view = h.book(STI_PANEL, card(GOOD_CARD), 48 + 1).await;
    assert_eq!(view.payment.status, PaymentStatus::Completed);
    h.bookings.confirm(&staff(), view.booking.id).await.unwrap();

    let canceled = h
        .bookings
        .cancel(&customer(), view.booking.id, "schedule conflict")
        .await
        .unwrap();
    assert_eq!(canceled.booking.status, BookingStatus::Canceled);

    let RefundOutcome::Refunded(payment) = canceled.refund else {
        panic!("expected a gateway refund, got {:?}", canceled.refund);
    };
    assert_eq!(payment.status, PaymentStatus::Refunded);
    assert_eq!(payment.refund_amount, Some(payment.amount.clone()));
    assert!(payment.refunded_at.is_some());
    assert!(payment.refund_id.is_some());
    assert_eq!(h.gateway.refund_calls(), 1);
}

#[tokio::test]
async fn refund_failure_does_not_block_cancellation() {
    let h = Harness::new();
    h.gateway.fail_refunds("charge already disputed");
    let view = h.book(STI_PANEL, card(GOOD_CARD), 72).await;

    let canceled = h
        .bookings
        .cancel(&staff(), view.booking.id, "clinic closed")
        .await
        .unwrap();
    assert_eq!(canceled.booking.status, BookingStatus::Canceled);
    assert_eq!(
        canceled.refund,
        RefundOutcome::Failed {
            reason: "charge already disputed".to_string()
        }
    );

    let payment = h.payments.get(view.payment.id).await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Completed);
    assert!(payment.refund_amount.is_none());
    assert!(payment
        .notes
        .iter()
        .any(|n| n.contains("Refund attempt failed: charge already disputed")));
}

#[tokio::test]
async fn canceling_a_pending_qr_booking_refunds_nothing() {
    let h = Harness::new();
    let view = h.book(HIV_RAPID, MethodParams::Qr, 72).await;
    let canceled = h
        .bookings
        .cancel(&customer(), view.booking.id, "changed my mind")
        .await
        .unwrap();
    assert_eq!(canceled.refund, RefundOutcome::NotEligible);
    assert_eq!(
        h.payments.get(view.payment.id).await.unwrap().status,
        PaymentStatus::Pending
    );
}

#[tokio::test]
async fn other_customers_cannot_cancel() {
    let h = Harness::new();
    let view = h.book(STI_PANEL, MethodParams::Cod, 72).await;
    let err = h
        .bookings
        .cancel(
            &clinic_booking_engine::services::Actor::customer("cust-2"),
            view.booking.id,
            "not mine",
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Forbidden { .. }));
}

#[tokio::test]
async fn expired_qr_regeneration_relinks_the_booking() {
    let h = Harness::with_config(PaymentsConfig {
        qr_expiry_hours: 0,
        ..PaymentsConfig::default()
    });
    let view = h.book(HIV_RAPID, MethodParams::Qr, 72).await;
    h.sweeper().run_cycle().await.unwrap();

    let regenerated = h
        .bookings
        .regenerate_qr(&customer(), view.payment.id)
        .await
        .unwrap();
    assert_ne!(regenerated.record.id, view.payment.id);
    assert_eq!(regenerated.record.status, PaymentStatus::Pending);
    assert_ne!(regenerated.record.qr_reference, view.payment.qr_reference);

    let booking = h.bookings.get(&customer(), view.booking.id).await.unwrap();
    assert_eq!(booking.booking.payment_record_id, regenerated.record.id);
    assert_eq!(
        h.payments.get(view.payment.id).await.unwrap().status,
        PaymentStatus::Expired
    );
}

#[tokio::test]
async fn regeneration_is_refused_for_canceled_bookings() {
    let h = Harness::with_config(PaymentsConfig {
        qr_expiry_hours: 0,
        ..PaymentsConfig::default()
    });
    let view = h.book(HIV_RAPID, MethodParams::Qr, 72).await;
    h.sweeper().run_cycle().await.unwrap();
    h.bookings
        .cancel(&customer(), view.booking.id, "no longer needed")
        .await
        .unwrap();

    let err = h
        .bookings
        .regenerate_qr(&customer(), view.payment.id)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BookingError::InvalidTransition {
            current: BookingStatus::Canceled,
            ..
        }
    ));
    assert_eq!(h.store.payment_count().await, 1);
}

#[tokio::test]
async fn completed_qr_payment_cannot_be_regenerated() {
    let h = Harness::new();
    let view = h.book(HIV_RAPID, MethodParams::Qr, 72).await;
    let reference = view.payment.qr_reference.clone().unwrap();
    h.payments
        .manual_confirm_qr(&reference, STAFF, None, None)
        .await
        .unwrap();

    let err = h
        .bookings
        .regenerate_qr(&customer(), view.payment.id)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BookingError::Payment(PaymentError::InvalidTransition {
            current: PaymentStatus::Completed,
            requested: PaymentStatus::Pending,
        })
    ));
}
