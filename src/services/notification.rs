use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NotificationEvent {
    PaymentConfirmed {
        payment_id: Uuid,
        owner_id: String,
        amount: String,
        method: String,
    },
    PaymentFailed {
        payment_id: Uuid,
        owner_id: String,
        reason: String,
    },
    PaymentExpired {
        payment_id: Uuid,
        owner_id: String,
        qr_reference: Option<String>,
    },
    BookingConfirmed {
        booking_id: Uuid,
        customer_ref: String,
    },
    BookingCanceled {
        booking_id: Uuid,
        customer_ref: String,
        refund: String,
    },
    ManualRefundRequired {
        payment_id: Uuid,
        owner_id: String,
        amount: String,
        qr_reference: Option<String>,
    },
}

impl NotificationEvent {
    pub fn name(&self) -> &'static str {
        match self {
            NotificationEvent::PaymentConfirmed { .. } => "payment_confirmed",
            NotificationEvent::PaymentFailed { .. } => "payment_failed",
            NotificationEvent::PaymentExpired { .. } => "payment_expired",
            NotificationEvent::BookingConfirmed { .. } => "booking_confirmed",
            NotificationEvent::BookingCanceled { .. } => "booking_canceled",
            NotificationEvent::ManualRefundRequired { .. } => "manual_refund_required",
        }
    }
}

/// Delivery channel for user and staff notifications. Implementations own
/// their failures; nothing is reported back to the caller.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch(&self, event: NotificationEvent);
}

/// Writes each event as a structured log line.
#[derive(Debug, Default, Clone)]
pub struct LoggingNotificationDispatcher;

#[async_trait]
impl NotificationDispatcher for LoggingNotificationDispatcher {
    async fn dispatch(&self, event: NotificationEvent) {
        match &event {
            NotificationEvent::PaymentFailed {
                payment_id, reason, ..
            } => {
                warn!(
                    payment_id = %payment_id,
                    reason = %reason,
                    "🔔 NOTIFICATION: payment failed"
                );
            }
            NotificationEvent::ManualRefundRequired {
                payment_id,
                amount,
                qr_reference,
                ..
            } => {
                warn!(
                    payment_id = %payment_id,
                    amount = %amount,
                    qr_reference = ?qr_reference,
                    "🔔 NOTIFICATION: manual bank refund required"
                );
            }
            other => {
                let payload = serde_json::to_string(other).unwrap_or_default();
                info!(event = other.name(), payload = %payload, "🔔 NOTIFICATION");
            }
        }
    }
}

/// Fire-and-forget handle; `notify` returns immediately.
#[derive(Clone)]
pub struct Notifier {
    dispatcher: Arc<dyn NotificationDispatcher>,
}

impl Notifier {
    pub fn new(dispatcher: Arc<dyn NotificationDispatcher>) -> Self {
        Self { dispatcher }
    }

    pub fn notify(&self, event: NotificationEvent) {
        let dispatcher = self.dispatcher.clone();
        tokio::spawn(async move {
            dispatcher.dispatch(event).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    struct ChannelDispatcher(mpsc::UnboundedSender<NotificationEvent>);

    #[async_trait]
    impl NotificationDispatcher for ChannelDispatcher {
        async fn dispatch(&self, event: NotificationEvent) {
            let _ = self.0.send(event);
        }
    }

    #[tokio::test]
    async fn notify_delivers_on_background_task() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let notifier = Notifier::new(Arc::new(ChannelDispatcher(tx)));
        let event = NotificationEvent::BookingConfirmed {
            booking_id: Uuid::new_v4(),
            customer_ref: "cust-1".to_string(),
        };
        notifier.notify(event.clone());
        assert_eq!(rx.recv().await, Some(event));
    }

    #[test]
    fn events_serialize_with_tag() {
        let json = serde_json::to_value(NotificationEvent::PaymentExpired {
            payment_id: Uuid::nil(),
            owner_id: "cust-1".to_string(),
            qr_reference: Some("R1".to_string()),
        })
        .unwrap();
        assert_eq!(json["event"], "payment_expired");
    }
}
