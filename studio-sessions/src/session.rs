//! Session lifecycle types and the status state machine
//!
//! ```text
//! available ──► requested ──► scheduled ──► confirmed ──► completed
//!     └──────────────────────────┘   └─────────────────────┘
//! requested | scheduled | confirmed ──► cancelled
//! ```
//!
//! Database rows carry these as text; [`Session::try_from`] parses a
//! [`SessionRecord`] and rejects values outside the enums.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use studio_common::db::SessionRecord;
use studio_common::{time, Error};

macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(Error::InvalidInput(format!(
                        "Invalid {}: '{}' (expected one of: {})",
                        stringify!($name),
                        other,
                        [$($text),+].join(", ")
                    ))),
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Available,
    Requested,
    Scheduled,
    Confirmed,
    Completed,
    Cancelled,
}

text_enum!(SessionStatus {
    Available => "available",
    Requested => "requested",
    Scheduled => "scheduled",
    Confirmed => "confirmed",
    Completed => "completed",
    Cancelled => "cancelled",
});

impl SessionStatus {
    /// Statuses from which `next` may be entered
    pub fn predecessors(next: SessionStatus) -> &'static [SessionStatus] {
        use SessionStatus::*;
        match next {
            Available => &[],
            Requested => &[Available],
            Scheduled => &[Available, Requested],
            Confirmed => &[Scheduled],
            Completed => &[Scheduled, Confirmed],
            Cancelled => &[Requested, Scheduled, Confirmed],
        }
    }

    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        Self::predecessors(next).contains(&self)
    }

    pub fn is_cancellable(self) -> bool {
        self.can_transition_to(SessionStatus::Cancelled)
    }
}

/// Admin disposition of a cancelled session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CancellationDecision {
    Pending,
    Charged,
    Waived,
}

text_enum!(CancellationDecision {
    Pending => "pending",
    Charged => "charged",
    Waived => "waived",
});

/// How a charged cancellation is priced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeType {
    None,
    Full,
    Partial,
    LateFee,
}

text_enum!(ChargeType {
    None => "none",
    Full => "full",
    Partial => "partial",
    LateFee => "late_fee",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Trainer,
    Client,
}

text_enum!(Role {
    Admin => "admin",
    Trainer => "trainer",
    Client => "client",
});

/// A cancellation closer to the session than the policy window is late
pub fn is_late_cancellation(
    session_date: DateTime<Utc>,
    cancelled_at: DateTime<Utc>,
    window_hours: i64,
) -> bool {
    time::hours_between(cancelled_at, session_date) < window_hours as f64
}

/// Typed view of a session row
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: i64,
    pub session_date: DateTime<Utc>,
    pub duration: i64,
    pub client_id: Option<i64>,
    pub trainer_id: Option<i64>,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub status: SessionStatus,
    pub credit_deducted: bool,
    pub credit_restored: bool,
    pub cancellation_reason: Option<String>,
    pub cancelled_by: Option<i64>,
    pub cancellation_date: Option<DateTime<Utc>>,
    pub silent_cancellation: bool,
    pub cancellation_decision: Option<CancellationDecision>,
    pub cancellation_reviewed_by: Option<i64>,
    pub cancellation_reviewed_at: Option<DateTime<Utc>>,
    pub cancellation_review_reason: Option<String>,
    pub cancellation_charge_type: Option<ChargeType>,
    pub cancellation_charge_cents: Option<i64>,
    pub cancellation_charged_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Whether `user_id` is the booked client or the assigned trainer
    pub fn involves(&self, user_id: i64) -> bool {
        self.client_id == Some(user_id) || self.trainer_id == Some(user_id)
    }
}

impl TryFrom<SessionRecord> for Session {
    type Error = Error;

    fn try_from(r: SessionRecord) -> Result<Self, Self::Error> {
        let status: SessionStatus = r.status.parse()?;
        let cancellation_decision = r
            .cancellation_decision
            .as_deref()
            .map(CancellationDecision::from_str)
            .transpose()?;

        // A decision on a non-cancelled session means the row was edited by hand
        if cancellation_decision.is_some() && status != SessionStatus::Cancelled {
            return Err(Error::Internal(format!(
                "Session {} has a cancellation decision but status '{}'",
                r.id, status
            )));
        }

        Ok(Session {
            id: r.id,
            session_date: r.session_date,
            duration: r.duration,
            client_id: r.client_id,
            trainer_id: r.trainer_id,
            location: r.location,
            notes: r.notes,
            status,
            credit_deducted: r.credit_deducted,
            credit_restored: r.credit_restored,
            cancellation_reason: r.cancellation_reason,
            cancelled_by: r.cancelled_by,
            cancellation_date: r.cancellation_date,
            silent_cancellation: r.silent_cancellation,
            cancellation_decision,
            cancellation_reviewed_by: r.cancellation_reviewed_by,
            cancellation_reviewed_at: r.cancellation_reviewed_at,
            cancellation_review_reason: r.cancellation_review_reason,
            cancellation_charge_type: r
                .cancellation_charge_type
                .as_deref()
                .map(ChargeType::from_str)
                .transpose()?,
            cancellation_charge_cents: r.cancellation_charge_cents,
            cancellation_charged_at: r.cancellation_charged_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use SessionStatus::*;

    #[test]
    fn test_forward_transitions_allowed() {
        assert!(Available.can_transition_to(Requested));
        assert!(Available.can_transition_to(Scheduled));
        assert!(Requested.can_transition_to(Scheduled));
        assert!(Scheduled.can_transition_to(Confirmed));
        assert!(Scheduled.can_transition_to(Completed));
        assert!(Confirmed.can_transition_to(Completed));
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for next in SessionStatus::ALL {
            assert!(!Completed.can_transition_to(*next), "completed -> {}", next);
            assert!(!Cancelled.can_transition_to(*next), "cancelled -> {}", next);
        }
    }

    #[test]
    fn test_cancellable_statuses() {
        let cancellable: Vec<_> = SessionStatus::ALL
            .iter()
            .copied()
            .filter(|s| s.is_cancellable())
            .collect();
        assert_eq!(cancellable, vec![Requested, Scheduled, Confirmed]);
    }

    #[test]
    fn test_backward_transitions_rejected() {
        assert!(!Confirmed.can_transition_to(Scheduled));
        assert!(!Scheduled.can_transition_to(Available));
        assert!(!Requested.can_transition_to(Confirmed));
        assert!(!Available.can_transition_to(Completed));
    }

    #[test]
    fn test_text_round_trip_and_rejection() {
        assert_eq!("late_fee".parse::<ChargeType>().unwrap(), ChargeType::LateFee);
        assert_eq!(CancellationDecision::Waived.as_str(), "waived");
        assert!("refunded".parse::<CancellationDecision>().is_err());
        assert!("Cancelled".parse::<SessionStatus>().is_err());
    }

    #[test]
    fn test_late_cancellation_window() {
        let now = time::now();
        assert!(is_late_cancellation(now + Duration::hours(23), now, 24));
        assert!(!is_late_cancellation(now + Duration::hours(25), now, 24));
        // Already started or past
        assert!(is_late_cancellation(now - Duration::hours(1), now, 24));
    }

    fn record(status: &str, decision: Option<&str>) -> SessionRecord {
        SessionRecord {
            id: 1,
            session_date: time::now(),
            duration: 60,
            client_id: Some(2),
            trainer_id: Some(3),
            location: None,
            notes: None,
            status: status.to_string(),
            credit_deducted: false,
            credit_restored: false,
            cancellation_reason: None,
            cancelled_by: None,
            cancellation_date: None,
            silent_cancellation: false,
            cancellation_decision: decision.map(str::to_string),
            cancellation_reviewed_by: None,
            cancellation_reviewed_at: None,
            cancellation_review_reason: None,
            cancellation_charge_type: None,
            cancellation_charge_cents: None,
            cancellation_charged_at: None,
        }
    }

    #[test]
    fn test_decision_only_valid_on_cancelled_rows() {
        let session = Session::try_from(record("cancelled", Some("pending"))).unwrap();
        assert_eq!(session.cancellation_decision, Some(CancellationDecision::Pending));
        assert!(session.involves(2));
        assert!(session.involves(3));
        assert!(!session.involves(4));

        assert!(Session::try_from(record("scheduled", Some("charged"))).is_err());
        assert!(Session::try_from(record("cancelled", Some("maybe"))).is_err());
        assert!(Session::try_from(record("scheduled", None)).is_ok());
    }
}
