use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use super::Slot;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Technician {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub technician_type: String,
    pub working_hours_start: u32,
    pub working_hours_end: u32,
    pub is_active: bool,
}

impl Technician {
    /// Working window on `date`. An end hour of 24 lands on midnight of the next day.
    pub fn working_window(&self, date: NaiveDate) -> Slot {
        let midnight = date.and_time(NaiveTime::MIN);
        Slot::new(
            midnight + Duration::hours(i64::from(self.working_hours_start)),
            midnight + Duration::hours(i64::from(self.working_hours_end)),
        )
    }

    /// Whether an appointment may start at `time`.
    pub fn works_at(&self, time: &NaiveDateTime) -> bool {
        let hour = time.hour();
        hour >= self.working_hours_start && hour < self.working_hours_end
    }

    /// Case-insensitive type match that tolerates a plural request ("plumbers").
    pub fn matches_type(&self, requested: &str) -> bool {
        let own = self.technician_type.trim().to_lowercase();
        let requested = requested.trim().to_lowercase();
        own == requested || requested.strip_suffix('s').is_some_and(|r| r == own)
    }

    pub fn working_hours_label(&self) -> String {
        format!("{}:00-{}:00", self.working_hours_start, self.working_hours_end)
    }
}

/// Snapshot of one technician used to build the interpreter prompt and to rank candidates.
#[derive(Debug, Clone)]
pub struct RosterEntry {
    pub technician: Technician,
    /// Id of the newest booking ever made with this technician; ids grow with creation order.
    pub last_booking_id: Option<i64>,
    pub open_slots_today: Vec<Slot>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plumber() -> Technician {
        Technician {
            id: 1,
            name: "Nicolas Woollett".to_string(),
            technician_type: "Plumber".to_string(),
            working_hours_start: 9,
            working_hours_end: 17,
            is_active: true,
        }
    }

    #[test]
    fn test_matches_type_case_insensitive() {
        let t = plumber();
        assert!(t.matches_type("plumber"));
        assert!(t.matches_type(" PLUMBER "));
        assert!(t.matches_type("plumbers"));
        assert!(!t.matches_type("electrician"));
    }

    #[test]
    fn test_works_at() {
        let t = plumber();
        let at = |s: &str| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap();
        assert!(t.works_at(&at("2025-10-15 09:00")));
        assert!(t.works_at(&at("2025-10-15 16:30")));
        assert!(!t.works_at(&at("2025-10-15 17:00")));
        assert!(!t.works_at(&at("2025-10-15 08:59")));
    }

    #[test]
    fn test_working_window_until_midnight() {
        let mut t = plumber();
        t.working_hours_end = 24;
        let date = NaiveDate::from_ymd_opt(2025, 10, 15).unwrap();
        let window = t.working_window(date);
        assert_eq!(window.end, NaiveDate::from_ymd_opt(2025, 10, 16).unwrap().and_time(NaiveTime::MIN));
    }
}
