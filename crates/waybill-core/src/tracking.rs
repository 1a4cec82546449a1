//! Tracking history domain model.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Global status of a shipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrackingStatus {
    /// The shipment is moving through the carrier network.
    Processing,
    /// The shipment has been delivered.
    Completed,
    /// The shipment is at the origin facility.
    Origin,
    /// The shipment was returned to sender.
    Return,
    /// There is an issue with the shipment.
    Incidence,
}

impl TrackingStatus {
    /// Terminal statuses are never demoted by later non-terminal events.
    pub fn is_terminal(self) -> bool {
        matches!(self, TrackingStatus::Completed | TrackingStatus::Return)
    }

    /// Applies a status override while iterating events in carrier order:
    /// last match wins, except that a terminal status sticks against
    /// non-terminal candidates.
    pub fn transition(self, next: TrackingStatus) -> TrackingStatus {
        if self.is_terminal() && !next.is_terminal() {
            self
        } else {
            next
        }
    }
}

/// Complete tracking information for a shipment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingHistory {
    /// Overall status derived from the events.
    pub global_status: TrackingStatus,
    /// Events in the order the carrier reported them.
    pub history: Vec<TrackingEvent>,
}

impl TrackingHistory {
    /// An empty history in the default PROCESSING state.
    pub fn new() -> Self {
        Self {
            global_status: TrackingStatus::Processing,
            history: Vec::new(),
        }
    }
}

impl Default for TrackingHistory {
    fn default() -> Self {
        Self::new()
    }
}

/// A single event in a shipment's tracking history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingEvent {
    /// When the event occurred. The zero instant when the carrier feed
    /// emitted an empty or malformed timestamp.
    pub date: NaiveDateTime,
    /// Carrier description of the event.
    pub text: String,
    /// Location of the event; empty when the carrier does not emit one.
    pub city: String,
    /// Carrier-specific status token, preserved verbatim.
    pub code: String,
}

/// The instant substituted for unparseable carrier timestamps.
pub fn zero_instant() -> NaiveDateTime {
    chrono::DateTime::UNIX_EPOCH.naive_utc()
}

/// Parses a carrier timestamp, falling back to the zero instant. Carrier
/// feeds intermittently emit empty or malformed dates and the surrounding
/// events are still worth returning.
pub(crate) fn parse_date_or_zero(raw: &str, format: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(raw.trim(), format).unwrap_or_else(|_| zero_instant())
}

/// Identifier of a supported courier.
///
/// This is the routing key from the dispatcher to the adapters and part of
/// every tracking cache key. Free-form carrier strings extracted from orders
/// stay plain strings until they reach the tracking endpoint, where anything
/// outside this set is rejected as unsupported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CourierId {
    Interrapidisimo,
    Servientrega,
    Coordinadora,
}

impl CourierId {
    pub const ALL: [CourierId; 3] = [
        CourierId::Interrapidisimo,
        CourierId::Servientrega,
        CourierId::Coordinadora,
    ];

    /// Canonical tag, e.g. `interrapidisimo_co`.
    pub fn as_str(self) -> &'static str {
        match self {
            CourierId::Interrapidisimo => "interrapidisimo_co",
            CourierId::Servientrega => "servientrega_co",
            CourierId::Coordinadora => "coordinadora_co",
        }
    }
}

impl fmt::Display for CourierId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for courier tags outside the supported set.
#[derive(Debug, Error)]
#[error("unknown courier: {0}")]
pub struct UnknownCourier(pub String);

impl FromStr for CourierId {
    type Err = UnknownCourier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CourierId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| UnknownCourier(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_upper_case() {
        let json = serde_json::to_string(&TrackingStatus::Incidence).unwrap();
        assert_eq!(json, "\"INCIDENCE\"");
    }

    #[test]
    fn terminal_status_sticks_against_non_terminal() {
        let status = TrackingStatus::Completed.transition(TrackingStatus::Incidence);
        assert_eq!(status, TrackingStatus::Completed);
    }

    #[test]
    fn terminal_status_yields_to_later_terminal() {
        let status = TrackingStatus::Completed.transition(TrackingStatus::Return);
        assert_eq!(status, TrackingStatus::Return);
    }

    #[test]
    fn non_terminal_follows_last_match() {
        let status = TrackingStatus::Processing.transition(TrackingStatus::Incidence);
        assert_eq!(status, TrackingStatus::Incidence);
    }

    #[test]
    fn event_date_serializes_without_zone() {
        let event = TrackingEvent {
            date: parse_date_or_zero("31/01/2026 12:51 ", "%d/%m/%Y %H:%M"),
            text: "Guia generada".to_string(),
            city: "Bogota (Cundinamarca)".to_string(),
            code: "1".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["date"], "2026-01-31T12:51:00");
    }

    #[test]
    fn malformed_date_becomes_zero_instant() {
        assert_eq!(parse_date_or_zero("", "%Y-%m-%d %H:%M:%S"), zero_instant());
        assert_eq!(
            parse_date_or_zero("not-a-date", "%Y-%m-%d %H:%M:%S"),
            zero_instant()
        );
    }

    #[test]
    fn courier_id_round_trips_through_tags() {
        for id in CourierId::ALL {
            assert_eq!(id.as_str().parse::<CourierId>().unwrap(), id);
        }
        assert!("unknown_courier".parse::<CourierId>().is_err());
    }
}
