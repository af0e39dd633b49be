use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use super::Technician;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum IntentKind {
    Create,
    Cancel,
    Query,
    Unknown,
}

impl IntentKind {
    pub fn parse(action: &str) -> Self {
        match action.trim().to_lowercase().as_str() {
            "create" | "book" | "schedule" => IntentKind::Create,
            "cancel" | "delete" | "remove" => IntentKind::Cancel,
            "query" | "list" | "check" | "status" => IntentKind::Query,
            _ => IntentKind::Unknown,
        }
    }
}

/// Part of the day a partial time expression refers to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DayPeriod {
    Morning,
    Afternoon,
    Evening,
    Any,
}

impl DayPeriod {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "morning" => Some(DayPeriod::Morning),
            "afternoon" => Some(DayPeriod::Afternoon),
            "evening" | "night" => Some(DayPeriod::Evening),
            "any" | "anytime" | "day" | "all day" => Some(DayPeriod::Any),
            _ => None,
        }
    }

    /// `[start, end)` of the period on `date`: morning before noon, afternoon
    /// noon to 17:00, evening 17:00 to midnight.
    pub fn bounds(&self, date: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
        let midnight = date.and_time(NaiveTime::MIN);
        let (from, to) = match self {
            DayPeriod::Morning => (0, 12),
            DayPeriod::Afternoon => (12, 17),
            DayPeriod::Evening => (17, 24),
            DayPeriod::Any => (0, 24),
        };
        (midnight + Duration::hours(from), midnight + Duration::hours(to))
    }

    pub fn label(&self) -> &'static str {
        match self {
            DayPeriod::Morning => "in the morning",
            DayPeriod::Afternoon => "in the afternoon",
            DayPeriod::Evening => "in the evening",
            DayPeriod::Any => "",
        }
    }
}

/// When the user wants the appointment: either an exact start or a window to pick from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestedTime {
    Exact(NaiveDateTime),
    Window { date: NaiveDate, period: DayPeriod },
}

/// What the assistant has to ask for before it can act.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clarification {
    TechnicianType,
    Time,
    BookingId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedIntent {
    pub kind: IntentKind,
    pub technician_type: Option<String>,
    pub requested_time: Option<RequestedTime>,
    pub booking_id: Option<i64>,
    /// Active technicians of `technician_type`, least-recently-booked first.
    pub candidates: Vec<Technician>,
    pub clarification: Option<Clarification>,
    pub justification: Option<String>,
}

impl ParsedIntent {
    pub fn unknown() -> Self {
        Self {
            kind: IntentKind::Unknown,
            technician_type: None,
            requested_time: None,
            booking_id: None,
            candidates: Vec::new(),
            clarification: None,
            justification: None,
        }
    }

    /// Downgrade to UNKNOWN while keeping what was extracted, so the reply can ask for the rest.
    pub fn needs(mut self, clarification: Clarification) -> Self {
        self.kind = IntentKind::Unknown;
        self.clarification = Some(clarification);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_kind_synonyms() {
        assert_eq!(IntentKind::parse("create"), IntentKind::Create);
        assert_eq!(IntentKind::parse("Book"), IntentKind::Create);
        assert_eq!(IntentKind::parse("CANCEL"), IntentKind::Cancel);
        assert_eq!(IntentKind::parse("query"), IntentKind::Query);
        assert_eq!(IntentKind::parse("reschedule"), IntentKind::Unknown);
    }

    #[test]
    fn test_afternoon_bounds() {
        let date = NaiveDate::from_ymd_opt(2025, 10, 15).unwrap();
        let (start, end) = DayPeriod::Afternoon.bounds(date);
        assert_eq!(start, date.and_hms_opt(12, 0, 0).unwrap());
        assert_eq!(end, date.and_hms_opt(17, 0, 0).unwrap());
    }
}
