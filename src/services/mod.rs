pub mod booking_service;
pub mod booking_state;
pub mod catalog;
pub mod notification;
pub mod payment_service;
pub mod refund_dispatcher;

pub use booking_service::{Actor, ActorRole, BookingError, BookingService};
pub use payment_service::PaymentService;
pub use refund_dispatcher::{RefundDispatcher, RefundOutcome};
