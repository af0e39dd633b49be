use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::Technician;

/// Every appointment occupies a fixed one-hour block starting at `booking_time`.
pub const BOOKING_DURATION_MINUTES: i64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub id: i64,
    pub technician_id: i64,
    pub booking_time: NaiveDateTime,
    pub description: Option<String>,
    pub status: BookingStatus,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Booking {
    pub fn duration() -> Duration {
        Duration::minutes(BOOKING_DURATION_MINUTES)
    }

    /// Exclusive end of the booked interval `[booking_time, end_time)`.
    pub fn end_time(&self) -> NaiveDateTime {
        self.booking_time + Self::duration()
    }

    pub fn is_active(&self) -> bool {
        self.status == BookingStatus::Booked
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Booked,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Booked => "booked",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    /// Anything that is not explicitly `booked` is treated as inactive.
    pub fn parse(s: &str) -> Self {
        match s {
            "booked" => BookingStatus::Booked,
            _ => BookingStatus::Cancelled,
        }
    }
}

/// A booking joined with the technician it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookingDetails {
    #[serde(flatten)]
    pub booking: Booking,
    pub technician: Technician,
}
