//! Session reservation records.

use crate::resource::CardinalityRequest;
use crate::time::TimeInterval;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Invalid reservation identifier sentinel; valid ids are positive.
pub const INVALID_RESERVATION_ID: i32 = -1;

/// One booked session slot in the agenda.
///
/// Records are immutable once inserted; changing a booking means removing
/// it and adding a new one under a fresh identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionReservation {
    /// Unique positive identifier assigned by the agenda
    pub id: i32,
    /// Session key (setup-unique mnemonic)
    pub key: String,
    /// Free-form description
    #[serde(default)]
    pub description: String,
    /// Principal who booked the session
    pub owner: String,
    /// Role under which the session runs
    pub role: String,
    /// Booked time slot
    pub when: TimeInterval,
    /// Extra token cardinalities for functional resources
    #[serde(default)]
    pub special_functional_cardinalities: CardinalityRequest,
    /// Extra token cardinalities for distributable resources
    #[serde(default)]
    pub special_distributable_cardinalities: CardinalityRequest,
    /// Model identifier of the root use case
    pub use_case_type_id: String,
    /// Configuration passed to the root use case at config-setup
    #[serde(default)]
    pub use_case_config: Option<serde_json::Value>,
    /// Macro executed when the session slot opens
    #[serde(default)]
    pub start_macro: Option<String>,
    /// Macro executed when the session slot closes
    #[serde(default)]
    pub stop_macro: Option<String>,
}

impl SessionReservation {
    pub fn is_valid(&self) -> bool {
        self.id > 0 && !self.key.is_empty() && !self.use_case_type_id.is_empty()
    }
}

impl PartialOrd for SessionReservation {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SessionReservation {
    /// Reservations order by begin instant, then end instant, then id.
    fn cmp(&self, other: &Self) -> Ordering {
        (self.when.begin(), self.when.end(), self.id).cmp(&(
            other.when.begin(),
            other.when.end(),
            other.id,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn reservation(id: i32, begin_h: u32, hours: i64) -> SessionReservation {
        let begin = Utc.with_ymd_and_hms(2026, 3, 14, begin_h, 0, 0).unwrap();
        SessionReservation {
            id,
            key: format!("shift_{}", id),
            description: String::new(),
            owner: "shifter".to_string(),
            role: "expert".to_string(),
            when: TimeInterval::from_duration(begin, Duration::hours(hours)).unwrap(),
            special_functional_cardinalities: CardinalityRequest::new(),
            special_distributable_cardinalities: CardinalityRequest::new(),
            use_case_type_id: "generic/noop".to_string(),
            use_case_config: None,
            start_macro: None,
            stop_macro: None,
        }
    }

    #[test]
    fn test_validity() {
        let r = reservation(4, 10, 2);
        assert!(r.is_valid());
        let mut bad = reservation(INVALID_RESERVATION_ID, 10, 2);
        assert!(!bad.is_valid());
        bad.id = 4;
        bad.key.clear();
        assert!(!bad.is_valid());
    }

    #[test]
    fn test_ordering_by_interval() {
        let early_short = reservation(3, 8, 1);
        let early_long = reservation(2, 8, 4);
        let late = reservation(1, 12, 1);
        let mut all = vec![late.clone(), early_long.clone(), early_short.clone()];
        all.sort();
        assert_eq!(
            all.iter().map(|r| r.id).collect::<Vec<_>>(),
            [early_short.id, early_long.id, late.id]
        );
    }

    #[test]
    fn test_serde_round_trip() {
        let mut r = reservation(7, 9, 3);
        r.start_macro = Some("hv_ramp_up".to_string());
        r.use_case_config = Some(serde_json::json!({"plateau_voltage": 1450.0}));
        let text = serde_json::to_string(&r).unwrap();
        let back: SessionReservation = serde_json::from_str(&text).unwrap();
        assert_eq!(back, r);
    }
}
