use chrono::{Duration, NaiveDateTime};

use crate::models::Booking;

/// Half-open intervals `[a_start, a_end)` and `[b_start, b_end)` share an instant.
pub fn overlaps(
    a_start: NaiveDateTime,
    a_end: NaiveDateTime,
    b_start: NaiveDateTime,
    b_end: NaiveDateTime,
) -> bool {
    a_start < b_end && b_start < a_end
}

/// First active booking of `technician_id` overlapping `[proposed_start, proposed_start + duration)`.
/// Cancelled bookings and other technicians' bookings are ignored.
pub fn find_conflict(
    existing: &[Booking],
    technician_id: i64,
    proposed_start: NaiveDateTime,
    duration: Duration,
) -> Option<&Booking> {
    let proposed_end = proposed_start + duration;
    existing.iter().find(|b| {
        b.technician_id == technician_id
            && b.is_active()
            && overlaps(proposed_start, proposed_end, b.booking_time, b.end_time())
    })
}

pub fn has_conflict(
    existing: &[Booking],
    technician_id: i64,
    proposed_start: NaiveDateTime,
    duration: Duration,
) -> bool {
    find_conflict(existing, technician_id, proposed_start, duration).is_some()
}
