pub mod error;
pub mod factory;
pub mod provider;
pub mod providers;
pub mod qr;
pub mod state;
pub mod strategy;
pub mod types;
pub mod utils;

pub use error::{PaymentError, PaymentResult};
pub use factory::PaymentStrategies;
pub use types::{
    CardDetails, InitiatedPayment, MethodParams, PaymentInstructions, PaymentMethod,
    PaymentPatch, PaymentRecord, PaymentRequest, PaymentStatus,
};
