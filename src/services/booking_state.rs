//! Booking workflow states.
//!
//! `PENDING → CONFIRMED → SAMPLED → RESULTED → COMPLETED`, with
//! `PENDING/CONFIRMED → CANCELED` as the only side exit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Sampled,
    Resulted,
    Completed,
    Canceled,
}

impl BookingStatus {
    pub const ALL: [BookingStatus; 6] = [
        BookingStatus::Pending,
        BookingStatus::Confirmed,
        BookingStatus::Sampled,
        BookingStatus::Resulted,
        BookingStatus::Completed,
        BookingStatus::Canceled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Sampled => "SAMPLED",
            BookingStatus::Resulted => "RESULTED",
            BookingStatus::Completed => "COMPLETED",
            BookingStatus::Canceled => "CANCELED",
        }
    }

    pub fn valid_transitions(&self) -> Vec<BookingStatus> {
        match self {
            BookingStatus::Pending => vec![BookingStatus::Confirmed, BookingStatus::Canceled],
            BookingStatus::Confirmed => vec![BookingStatus::Sampled, BookingStatus::Canceled],
            BookingStatus::Sampled => vec![BookingStatus::Resulted],
            BookingStatus::Resulted => vec![BookingStatus::Completed],
            BookingStatus::Completed => vec![],
            BookingStatus::Canceled => vec![],
        }
    }

    pub fn can_transition_to(&self, target: BookingStatus) -> bool {
        self.valid_transitions().contains(&target)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Canceled)
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_uppercase();
        // Accept the British spelling used by some clients.
        let normalized = if normalized == "CANCELLED" {
            "CANCELED".to_string()
        } else {
            normalized
        };
        BookingStatus::ALL
            .iter()
            .copied()
            .find(|s| s.as_str() == normalized)
            .ok_or_else(|| format!("unknown booking status: {}", value))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookingRecord {
    pub id: Uuid,
    pub customer_ref: String,
    pub service_ref: String,
    pub payment_record_id: Uuid,
    pub status: BookingStatus,
    pub appointment_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BookingRecord {
    pub fn new(
        customer_ref: impl Into<String>,
        service_ref: impl Into<String>,
        payment_record_id: Uuid,
        appointment_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            customer_ref: customer_ref.into(),
            service_ref: service_ref.into(),
            payment_record_id,
            status: BookingStatus::Pending,
            appointment_at,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workflow_is_sequential() {
        assert!(BookingStatus::Pending.can_transition_to(BookingStatus::Confirmed));
        assert!(BookingStatus::Confirmed.can_transition_to(BookingStatus::Sampled));
        assert!(BookingStatus::Sampled.can_transition_to(BookingStatus::Resulted));
        assert!(BookingStatus::Resulted.can_transition_to(BookingStatus::Completed));
        assert!(!BookingStatus::Pending.can_transition_to(BookingStatus::Sampled));
        assert!(!BookingStatus::Confirmed.can_transition_to(BookingStatus::Completed));
    }

    #[test]
    fn cancel_only_before_sampling() {
        assert!(BookingStatus::Pending.can_transition_to(BookingStatus::Canceled));
        assert!(BookingStatus::Confirmed.can_transition_to(BookingStatus::Canceled));
        assert!(!BookingStatus::Sampled.can_transition_to(BookingStatus::Canceled));
        assert!(!BookingStatus::Completed.can_transition_to(BookingStatus::Canceled));
    }

    #[test]
    fn status_parsing_accepts_both_spellings() {
        assert_eq!(
            BookingStatus::from_str("cancelled").unwrap(),
            BookingStatus::Canceled
        );
        assert_eq!(
            BookingStatus::from_str("SAMPLED").unwrap(),
            BookingStatus::Sampled
        );
        assert!(BookingStatus::from_str("LOST").is_err());
    }
}
