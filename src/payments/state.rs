//! Payment state machine.
//!
//! ```text
//! PENDING ──► PROCESSING ──► FAILED
//!    │            │
//!    ├────────────┴──► COMPLETED ──► REFUNDED
//!    │
//!    └──► EXPIRED
//! ```
//!
//! `FAILED`, `EXPIRED` and `REFUNDED` are final. `COMPLETED` only moves to
//! `REFUNDED`.

use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::types::PaymentStatus;

impl PaymentStatus {
    pub fn valid_transitions(&self) -> Vec<PaymentStatus> {
        match self {
            PaymentStatus::Pending => vec![
                PaymentStatus::Processing,
                PaymentStatus::Completed,
                PaymentStatus::Expired,
            ],
            PaymentStatus::Processing => vec![PaymentStatus::Completed, PaymentStatus::Failed],
            PaymentStatus::Completed => vec![PaymentStatus::Refunded],
            // Terminal states - no valid transitions
            PaymentStatus::Failed => vec![],
            PaymentStatus::Expired => vec![],
            PaymentStatus::Refunded => vec![],
        }
    }

    pub fn can_transition_to(&self, target: PaymentStatus) -> bool {
        self.valid_transitions().contains(&target)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Failed | PaymentStatus::Expired | PaymentStatus::Refunded
        )
    }

    /// Settled payments are the only ones that can gate a booking confirmation.
    pub fn is_settled(&self) -> bool {
        matches!(self, PaymentStatus::Completed)
    }
}

pub fn validate_transition(current: PaymentStatus, requested: PaymentStatus) -> PaymentResult<()> {
    if current.can_transition_to(requested) {
        Ok(())
    } else {
        Err(PaymentError::InvalidTransition { current, requested })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transitions_valid() {
        assert!(PaymentStatus::Pending.can_transition_to(PaymentStatus::Processing));
        assert!(PaymentStatus::Pending.can_transition_to(PaymentStatus::Completed));
        assert!(PaymentStatus::Pending.can_transition_to(PaymentStatus::Expired));
        assert!(PaymentStatus::Processing.can_transition_to(PaymentStatus::Completed));
        assert!(PaymentStatus::Processing.can_transition_to(PaymentStatus::Failed));
        assert!(PaymentStatus::Completed.can_transition_to(PaymentStatus::Refunded));
    }

    #[test]
    fn test_state_transitions_invalid() {
        // Completed may only be refunded
        assert!(!PaymentStatus::Completed.can_transition_to(PaymentStatus::Expired));
        assert!(!PaymentStatus::Completed.can_transition_to(PaymentStatus::Pending));
        // Pending cannot fail directly; only a card attempt in flight can
        assert!(!PaymentStatus::Pending.can_transition_to(PaymentStatus::Failed));
        assert!(!PaymentStatus::Processing.can_transition_to(PaymentStatus::Expired));
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for status in PaymentStatus::ALL {
            if status.is_terminal() {
                assert!(status.valid_transitions().is_empty(), "{} has exits", status);
            }
        }
        assert!(!PaymentStatus::Completed.is_terminal());
    }

    #[test]
    fn test_rejected_transition_reports_both_states() {
        let err = validate_transition(PaymentStatus::Expired, PaymentStatus::Completed).unwrap_err();
        match err {
            PaymentError::InvalidTransition { current, requested } => {
                assert_eq!(current, PaymentStatus::Expired);
                assert_eq!(requested, PaymentStatus::Completed);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
