//! Refund dispatch on cancellation.

mod common;

use bigdecimal::BigDecimal;
use clinic_booking_engine::payments::types::{MethodParams, PaymentStatus};
use clinic_booking_engine::services::booking_service::CanceledBooking;
use clinic_booking_engine::services::booking_state::BookingStatus;
use clinic_booking_engine::services::{BookingError, RefundDispatcher, RefundOutcome};
use common::*;

#[tokio::test]
async fn card_payment_is_refunded_exactly_once() {
    let h = Harness::new();
    let view = h.book(STI_PANEL, card(GOOD_CARD), 72).await;
    let paid = view.payment.clone();

    let dispatcher = RefundDispatcher::new(h.payments.clone());
    let first = dispatcher.dispatch(&paid, "duplicate booking").await.unwrap();
    assert!(matches!(first, RefundOutcome::Refunded(_)));

    // A second caller still holding the COMPLETED snapshot.
    let second = dispatcher.dispatch(&paid, "duplicate booking").await.unwrap();
    assert_eq!(second, RefundOutcome::AlreadyRefunded);

    // And one that reloaded the record.
    let reloaded = h.payments.get(paid.id).await.unwrap();
    let third = dispatcher
        .dispatch(&reloaded, "duplicate booking")
        .await
        .unwrap();
    assert_eq!(third, RefundOutcome::AlreadyRefunded);

    let stored = h.payments.get(paid.id).await.unwrap();
    assert_eq!(stored.status, PaymentStatus::Refunded);
    assert_eq!(stored.refund_amount, Some(BigDecimal::from(500_000)));
    assert_eq!(h.gateway.refund_calls(), 1);
}

#[tokio::test]
async fn concurrent_cancellations_refund_once() {
    let h = Harness::new();
    let view = h.book(STI_PANEL, card(GOOD_CARD), 72).await;

    let (customer_actor, staff_actor) = (customer(), staff());
    let (a, b) = tokio::join!(
        h.bookings.cancel(&customer_actor, view.booking.id, "first tab"),
        h.bookings.cancel(&staff_actor, view.booking.id, "second tab"),
    );
    let results = [a, b];
    let winners: Vec<&CanceledBooking> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    assert!(matches!(winners[0].refund, RefundOutcome::Refunded(_)));

    let loser = results.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert!(matches!(
        loser,
        BookingError::InvalidTransition {
            current: BookingStatus::Canceled,
            ..
        }
    ));

    let stored = h.payments.get(view.payment.id).await.unwrap();
    assert_eq!(stored.status, PaymentStatus::Refunded);
    assert_eq!(stored.refund_amount, Some(stored.amount.clone()));
}

#[tokio::test]
async fn cod_cancellation_never_touches_the_payment() {
    let h = Harness::new();
    let view = h.book(STI_PANEL, MethodParams::Cod, 72).await;

    let canceled = h
        .bookings
        .cancel(&customer(), view.booking.id, "feeling better")
        .await
        .unwrap();
    assert_eq!(canceled.refund, RefundOutcome::NotEligible);

    let stored = h.payments.get(view.payment.id).await.unwrap();
    assert_eq!(stored.status, PaymentStatus::Completed);
    assert_eq!(h.gateway.refund_calls(), 0);
}

#[tokio::test]
async fn paid_qr_cancellation_requests_a_manual_transfer() {
    let h = Harness::new();
    let view = h.book(HIV_RAPID, MethodParams::Qr, 72).await;
    let reference = view.payment.qr_reference.clone().unwrap();
    h.payments
        .manual_confirm_qr(&reference, STAFF, Some("FT-9".to_string()), None)
        .await
        .unwrap();

    let canceled = h
        .bookings
        .cancel(&customer(), view.booking.id, "travelling")
        .await
        .unwrap();
    let RefundOutcome::ManualTransferRequired(payment) = canceled.refund else {
        panic!("expected a manual transfer, got {:?}", canceled.refund);
    };
    assert_eq!(payment.status, PaymentStatus::Refunded);
    assert_eq!(payment.refund_amount, Some(BigDecimal::from(300_000)));
    assert!(payment.refund_id.is_none());

    let names = h.notifications.names().await;
    assert!(names.contains(&"manual_refund_required"));
    assert!(names.contains(&"booking_canceled"));
    assert_eq!(h.gateway.refund_calls(), 0);
}

#[tokio::test]
async fn cancellation_inside_lead_time_is_refused() {
    let h = Harness::new();
    let view = h.book(STI_PANEL, card(GOOD_CARD), 2).await;

    let err = h
        .bookings
        .cancel(&customer(), view.booking.id, "too late")
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::CancellationWindowClosed { .. }));

    let booking = h.bookings.get(&customer(), view.booking.id).await.unwrap();
    assert_eq!(booking.booking.status, BookingStatus::Pending);
    assert_eq!(
        h.payments.get(view.payment.id).await.unwrap().status,
        PaymentStatus::Completed
    );
    assert_eq!(h.gateway.refund_calls(), 0);
}

#[tokio::test]
async fn sampled_booking_cannot_be_canceled() {
    let h = Harness::new();
    let view = h.book(STI_PANEL, MethodParams::Cod, 72).await;
    h.bookings.confirm(&staff(), view.booking.id).await.unwrap();
    h.bookings
        .advance(&staff(), view.booking.id, BookingStatus::Sampled)
        .await
        .unwrap();

    let err = h
        .bookings
        .cancel(&staff(), view.booking.id, "lab error")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BookingError::InvalidTransition {
            current: BookingStatus::Sampled,
            requested: BookingStatus::Canceled,
        }
    ));
}
