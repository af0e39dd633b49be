use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};

use crate::errors::BookingError;
use crate::models::{Booking, DayPeriod, Slot, Technician};

/// Free intervals of `technician` on `date`: the working window minus every
/// active booking of that technician, in chronological order.
///
/// A fully booked day yields an empty list.
pub fn available_slots(
    technician: &Technician,
    date: NaiveDate,
    bookings: &[Booking],
) -> Result<Vec<Slot>, BookingError> {
    if !technician.is_active {
        return Err(BookingError::UnavailableTechnician {
            name: technician.name.clone(),
        });
    }

    let window = technician.working_window(date);

    let mut busy: Vec<Slot> = bookings
        .iter()
        .filter(|b| b.technician_id == technician.id && b.is_active())
        .filter_map(|b| Slot::new(b.booking_time, b.end_time()).clamp(window.start, window.end))
        .collect();
    busy.sort_by_key(|s| s.start);

    let mut free = Vec::new();
    let mut cursor = window.start;
    for interval in busy {
        if interval.start > cursor {
            free.push(Slot::new(cursor, interval.start));
        }
        cursor = cursor.max(interval.end);
    }
    if cursor < window.end {
        free.push(Slot::new(cursor, window.end));
    }

    Ok(free)
}

/// Portions of `slots` inside `[from, to)`.
pub fn slots_within(slots: &[Slot], from: NaiveDateTime, to: NaiveDateTime) -> Vec<Slot> {
    slots.iter().filter_map(|s| s.clamp(from, to)).collect()
}

/// Earliest appointment start for a window request.
///
/// Policy: the first whole hour that is inside `period` on `date`, strictly
/// after `now`, and leaves a full booking inside one free slot.
pub fn first_start_in(
    slots: &[Slot],
    date: NaiveDate,
    period: DayPeriod,
    now: NaiveDateTime,
) -> Option<NaiveDateTime> {
    let (period_start, period_end) = period.bounds(date);
    let earliest = period_start.max(next_whole_hour(now));

    slots.iter().find_map(|slot| {
        let start = ceil_to_hour(slot.start.max(earliest));
        (start < period_end && start + Booking::duration() <= slot.end).then_some(start)
    })
}

fn truncate_to_hour(t: NaiveDateTime) -> NaiveDateTime {
    t.date().and_hms_opt(t.hour(), 0, 0).unwrap_or(t)
}

fn ceil_to_hour(t: NaiveDateTime) -> NaiveDateTime {
    let floor = truncate_to_hour(t);
    if floor == t {
        t
    } else {
        floor + Duration::hours(1)
    }
}

fn next_whole_hour(now: NaiveDateTime) -> NaiveDateTime {
    truncate_to_hour(now) + Duration::hours(1)
}
