use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A contiguous free interval `[start, end)` inside a technician's working hours.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Slot {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Slot {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    /// Overlapping part of this slot and `[start, end)`, if any.
    pub fn clamp(&self, start: NaiveDateTime, end: NaiveDateTime) -> Option<Slot> {
        let s = self.start.max(start);
        let e = self.end.min(end);
        (s < e).then(|| Slot::new(s, e))
    }

    pub fn label(&self) -> String {
        format!("{}-{}", self.start.format("%H:%M"), self.end.format("%H:%M"))
    }
}
