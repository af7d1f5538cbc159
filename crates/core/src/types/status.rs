//! Visit status enum.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a scheduled visit.
///
/// `Scheduled` is the only non-terminal state. The closed set matches the
/// wire format used by the booking flow and the manual status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(feature = "postgres", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VisitStatus {
    /// Booked, appointment window not yet resolved.
    #[default]
    Scheduled,
    /// Customer showed up; discount unlocked.
    Completed,
    /// Appointment window elapsed with no show.
    Missed,
    /// Called off before the appointment.
    Cancelled,
}

impl VisitStatus {
    /// Whether this status admits no further transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Scheduled)
    }
}

impl std::fmt::Display for VisitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scheduled => write!(f, "SCHEDULED"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Missed => write!(f, "MISSED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

impl std::str::FromStr for VisitStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SCHEDULED" => Ok(Self::Scheduled),
            "COMPLETED" => Ok(Self::Completed),
            "MISSED" => Ok(Self::Missed),
            "CANCELLED" => Ok(Self::Cancelled),
            _ => Err(format!("invalid visit status: {s}")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!VisitStatus::Scheduled.is_terminal());
        assert!(VisitStatus::Completed.is_terminal());
        assert!(VisitStatus::Missed.is_terminal());
        assert!(VisitStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_wire_format_screaming_snake() {
        let json = serde_json::to_string(&VisitStatus::Completed).unwrap();
        assert_eq!(json, "\"COMPLETED\"");

        let parsed: VisitStatus = serde_json::from_str("\"MISSED\"").unwrap();
        assert_eq!(parsed, VisitStatus::Missed);
    }

    #[test]
    fn test_display_from_str_roundtrip() {
        for status in [
            VisitStatus::Scheduled,
            VisitStatus::Completed,
            VisitStatus::Missed,
            VisitStatus::Cancelled,
        ] {
            let parsed: VisitStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_from_str_rejects_unknown() {
        assert!("NO_SHOW".parse::<VisitStatus>().is_err());
        assert!("scheduled".parse::<VisitStatus>().is_err());
    }
}
