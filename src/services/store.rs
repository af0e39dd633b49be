use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{Duration, Local, NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::{Connection, TransactionBehavior};

use crate::db::queries;
use crate::errors::BookingError;
use crate::models::{Booking, BookingDetails, BookingStatus, RosterEntry, Slot, Technician};
use crate::services::{availability, scheduling};

/// Owner of technicians and bookings.
///
/// Every operation holds the connection lock for its whole read-check-write
/// sequence, so concurrent callers see either all of a write or none of it.
#[derive(Clone)]
pub struct BookingStore {
    conn: Arc<Mutex<Connection>>,
}

impl BookingStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, BookingError> {
        self.conn
            .lock()
            .map_err(|_| BookingError::Internal(anyhow::anyhow!("booking store lock poisoned")))
    }

    /// Run `f` against the connection under the store lock.
    pub fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> anyhow::Result<T>,
    ) -> Result<T, BookingError> {
        let conn = self.conn()?;
        Ok(f(&conn)?)
    }

    pub fn list_technicians(&self, active_only: bool) -> Result<Vec<Technician>, BookingError> {
        let conn = self.conn()?;
        Ok(queries::list_technicians(&conn, active_only)?)
    }

    pub fn get_technician(&self, id: i64) -> Result<Technician, BookingError> {
        let conn = self.conn()?;
        queries::get_technician(&conn, id)?
            .ok_or_else(|| BookingError::TechnicianNotFound(format!("id {id}")))
    }

    /// Active technicians with their booking recency and today's open slots, read as one snapshot.
    pub fn roster(&self, today: NaiveDate) -> Result<Vec<RosterEntry>, BookingError> {
        let conn = self.conn()?;
        let last_ids = queries::last_booking_ids(&conn)?;

        let mut roster = vec![];
        for technician in queries::list_technicians(&conn, true)? {
            let bookings = day_bookings(&conn, technician.id, today)?;
            let open_slots_today = availability::available_slots(&technician, today, &bookings)?;
            roster.push(RosterEntry {
                last_booking_id: last_ids.get(&technician.id).copied(),
                technician,
                open_slots_today,
            });
        }
        Ok(roster)
    }

    pub fn available_slots(&self, technician_id: i64, date: NaiveDate) -> Result<Vec<Slot>, BookingError> {
        let conn = self.conn()?;
        let technician = queries::get_technician(&conn, technician_id)?
            .ok_or_else(|| BookingError::TechnicianNotFound(format!("id {technician_id}")))?;
        let bookings = day_bookings(&conn, technician_id, date)?;
        availability::available_slots(&technician, date, &bookings)
    }

    pub fn has_conflict(
        &self,
        technician_id: i64,
        proposed_start: NaiveDateTime,
        duration: Duration,
    ) -> Result<bool, BookingError> {
        let conn = self.conn()?;
        let existing = queries::active_bookings_for_technician(
            &conn,
            technician_id,
            &(proposed_start - Booking::duration()),
            &(proposed_start + duration),
        )?;
        Ok(scheduling::has_conflict(&existing, technician_id, proposed_start, duration))
    }

    /// Validate and insert a booking in one immediate transaction.
    pub fn create_booking(
        &self,
        technician_id: i64,
        booking_time: NaiveDateTime,
        description: Option<&str>,
    ) -> Result<BookingDetails, BookingError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let technician = queries::get_technician(&tx, technician_id)?
            .filter(|t| t.is_active)
            .ok_or_else(|| BookingError::TechnicianNotFound(format!("id {technician_id}")))?;

        if !technician.works_at(&booking_time) {
            let hours = technician.working_hours_label();
            return Err(BookingError::TimeOutsideWorkingHours {
                name: technician.name,
                hours,
                time: booking_time,
            });
        }

        let duration = Booking::duration();
        let existing = queries::active_bookings_for_technician(
            &tx,
            technician_id,
            &(booking_time - duration),
            &(booking_time + duration),
        )?;
        if let Some(conflict) = scheduling::find_conflict(&existing, technician_id, booking_time, duration) {
            tracing::info!(
                technician_id,
                conflicting_booking = conflict.id,
                "booking rejected: overlaps an existing booking"
            );
            return Err(BookingError::SchedulingConflict {
                name: technician.name,
                time: booking_time,
            });
        }

        let id = queries::insert_booking(&tx, technician_id, &booking_time, description, &now())?;
        let details = queries::get_booking_details(&tx, id)?
            .ok_or_else(|| anyhow::anyhow!("booking {id} missing right after insert"))?;
        tx.commit()?;

        tracing::info!(booking_id = id, technician_id, time = %booking_time, "booking created");
        Ok(details)
    }

    /// Active bookings ordered by time ascending.
    pub fn list_bookings(&self) -> Result<Vec<BookingDetails>, BookingError> {
        let conn = self.conn()?;
        Ok(queries::list_active_booking_details(&conn)?)
    }

    pub fn get_booking(&self, id: i64) -> Result<BookingDetails, BookingError> {
        let conn = self.conn()?;
        queries::get_booking_details(&conn, id)?
            .filter(|d| d.booking.is_active())
            .ok_or(BookingError::BookingNotFound(id))
    }

    /// Cancel an active booking. Unknown or already cancelled ids fail with `BookingNotFound`.
    pub fn cancel_booking(&self, id: i64) -> Result<BookingDetails, BookingError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut details = queries::get_booking_details(&tx, id)?
            .filter(|d| d.booking.is_active())
            .ok_or(BookingError::BookingNotFound(id))?;

        let now = now();
        queries::update_booking_status(&tx, id, BookingStatus::Cancelled, &now)?;
        tx.commit()?;

        details.booking.status = BookingStatus::Cancelled;
        details.booking.updated_at = now;
        tracing::info!(booking_id = id, "booking cancelled");
        Ok(details)
    }

    /// Cancel every active booking; returns how many were affected.
    pub fn delete_all_bookings(&self) -> Result<usize, BookingError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let count = queries::cancel_all_active(&tx, &now())?;
        tx.commit()?;

        tracing::info!(count, "cancelled all active bookings");
        Ok(count)
    }
}

/// Bookings that can touch `date`: those starting within the day or up to one duration before it.
fn day_bookings(conn: &Connection, technician_id: i64, date: NaiveDate) -> anyhow::Result<Vec<Booking>> {
    let day_start = date.and_time(NaiveTime::MIN);
    queries::active_bookings_for_technician(
        conn,
        technician_id,
        &(day_start - Booking::duration()),
        &(day_start + Duration::days(1)),
    )
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn setup() -> (BookingStore, i64) {
        let conn = db::init_db(":memory:").unwrap();
        let plumber = queries::insert_technician(&conn, "Nicolas Woollett", "Plumber", 9, 17, true).unwrap();
        let store = BookingStore::new(conn);
        store
            .create_booking(plumber, dt("2025-10-15 10:00"), Some("Initial booking for Plumber"))
            .unwrap();
        (store, plumber)
    }

    #[test]
    fn test_overlapping_booking_conflicts() {
        let (store, plumber) = setup();
        let err = store
            .create_booking(plumber, dt("2025-10-15 10:30"), None)
            .unwrap_err();
        assert!(matches!(err, BookingError::SchedulingConflict { .. }));
        assert!(store.has_conflict(plumber, dt("2025-10-15 10:30"), Booking::duration()).unwrap());
    }

    #[test]
    fn test_back_to_back_booking_succeeds() {
        let (store, plumber) = setup();
        let created = store.create_booking(plumber, dt("2025-10-15 11:00"), None).unwrap();
        assert_eq!(created.booking.booking_time, dt("2025-10-15 11:00"));
        assert_eq!(created.technician.name, "Nicolas Woollett");
        assert_eq!(store.list_bookings().unwrap().len(), 2);
    }

    #[test]
    fn test_outside_working_hours() {
        let (store, plumber) = setup();
        let err = store
            .create_booking(plumber, dt("2025-10-15 17:00"), None)
            .unwrap_err();
        assert!(matches!(err, BookingError::TimeOutsideWorkingHours { .. }));
        let err = store
            .create_booking(plumber, dt("2025-10-15 08:00"), None)
            .unwrap_err();
        assert!(matches!(err, BookingError::TimeOutsideWorkingHours { .. }));
    }

    #[test]
    fn test_unknown_or_inactive_technician() {
        let (store, plumber) = setup();
        let err = store.create_booking(999, dt("2025-10-15 12:00"), None).unwrap_err();
        assert!(matches!(err, BookingError::TechnicianNotFound(_)));

        store
            .with_conn(|conn| queries::set_technician_active(conn, plumber, false))
            .unwrap();
        let err = store
            .create_booking(plumber, dt("2025-10-15 12:00"), None)
            .unwrap_err();
        assert!(matches!(err, BookingError::TechnicianNotFound(_)));

        let err = store
            .available_slots(plumber, NaiveDate::from_ymd_opt(2025, 10, 15).unwrap())
            .unwrap_err();
        assert!(matches!(err, BookingError::UnavailableTechnician { .. }));
        // history is kept
        assert_eq!(store.list_bookings().unwrap().len(), 1);
    }

    #[test]
    fn test_cancel_twice_fails_second_time() {
        let (store, _) = setup();
        let id = store.list_bookings().unwrap()[0].booking.id;

        let cancelled = store.cancel_booking(id).unwrap();
        assert_eq!(cancelled.booking.status, BookingStatus::Cancelled);

        let err = store.cancel_booking(id).unwrap_err();
        assert!(matches!(err, BookingError::BookingNotFound(i) if i == id));
        assert!(matches!(store.get_booking(id), Err(BookingError::BookingNotFound(_))));
        assert!(matches!(store.cancel_booking(999), Err(BookingError::BookingNotFound(999))));
    }

    #[test]
    fn test_cancelled_slot_can_be_rebooked() {
        let (store, plumber) = setup();
        let id = store.list_bookings().unwrap()[0].booking.id;
        store.cancel_booking(id).unwrap();

        let rebooked = store.create_booking(plumber, dt("2025-10-15 10:00"), None).unwrap();
        assert_ne!(rebooked.booking.id, id);
    }

    #[test]
    fn test_delete_all_then_list_is_empty() {
        let (store, plumber) = setup();
        store.create_booking(plumber, dt("2025-10-15 14:00"), None).unwrap();

        assert_eq!(store.delete_all_bookings().unwrap(), 2);
        assert!(store.list_bookings().unwrap().is_empty());
        assert_eq!(store.delete_all_bookings().unwrap(), 0);
    }

    #[test]
    fn test_list_bookings_sorted_by_time() {
        let (store, plumber) = setup();
        store.create_booking(plumber, dt("2025-10-14 15:00"), None).unwrap();
        store.create_booking(plumber, dt("2025-10-15 09:00"), None).unwrap();

        let times: Vec<_> = store
            .list_bookings()
            .unwrap()
            .into_iter()
            .map(|d| d.booking.booking_time)
            .collect();
        assert_eq!(
            times,
            vec![dt("2025-10-14 15:00"), dt("2025-10-15 09:00"), dt("2025-10-15 10:00")]
        );
    }

    #[test]
    fn test_concurrent_overlapping_creates_exactly_one_wins() {
        let (store, plumber) = setup();

        for round in 0..10 {
            let start = dt("2025-10-20 09:00") + Duration::days(round);
            let results: Vec<Result<BookingDetails, BookingError>> = std::thread::scope(|s| {
                let a = s.spawn(|| store.create_booking(plumber, start, None));
                let b = s.spawn(|| store.create_booking(plumber, start + Duration::minutes(30), None));
                vec![a.join().unwrap(), b.join().unwrap()]
            });

            let ok = results.iter().filter(|r| r.is_ok()).count();
            let conflicts = results
                .iter()
                .filter(|r| matches!(r, Err(BookingError::SchedulingConflict { .. })))
                .count();
            assert_eq!((ok, conflicts), (1, 1), "round {round}");
        }
    }

    #[test]
    fn test_roster_snapshot() {
        let (store, plumber) = setup();
        let roster = store.roster(NaiveDate::from_ymd_opt(2025, 10, 15).unwrap()).unwrap();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].technician.id, plumber);
        assert!(roster[0].last_booking_id.is_some());
        assert_eq!(roster[0].open_slots_today.len(), 2);
    }
}
