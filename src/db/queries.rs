use std::collections::HashMap;

use anyhow::Context;
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{Booking, BookingDetails, BookingStatus, Technician};

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const BOOKING_COLUMNS: &str =
    "b.id, b.technician_id, b.booking_time, b.description, b.status, b.created_at, b.updated_at";
const TECHNICIAN_COLUMNS: &str =
    "t.id, t.name, t.type, t.working_hours_start, t.working_hours_end, t.is_active";

fn fmt_ts(dt: &NaiveDateTime) -> String {
    dt.format(TS_FORMAT).to_string()
}

fn parse_ts(s: &str) -> anyhow::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TS_FORMAT).with_context(|| format!("bad timestamp in db: {s}"))
}

// ── Technicians ──

pub fn insert_technician(
    conn: &Connection,
    name: &str,
    technician_type: &str,
    working_hours_start: u32,
    working_hours_end: u32,
    is_active: bool,
) -> anyhow::Result<i64> {
    conn.execute(
        "INSERT INTO technicians (name, type, working_hours_start, working_hours_end, is_active)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![name, technician_type, working_hours_start, working_hours_end, is_active],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn set_technician_active(conn: &Connection, id: i64, is_active: bool) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE technicians SET is_active = ?1 WHERE id = ?2",
        params![is_active, id],
    )?;
    Ok(count > 0)
}

pub fn count_technicians(conn: &Connection) -> anyhow::Result<i64> {
    let count = conn.query_row("SELECT COUNT(*) FROM technicians", [], |row| row.get(0))?;
    Ok(count)
}

pub fn list_technicians(conn: &Connection, active_only: bool) -> anyhow::Result<Vec<Technician>> {
    let sql = format!(
        "SELECT {TECHNICIAN_COLUMNS} FROM technicians t {} ORDER BY t.id ASC",
        if active_only { "WHERE t.is_active = 1" } else { "" }
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |row| parse_technician_row(row, 0))?;

    let mut technicians = vec![];
    for row in rows {
        technicians.push(row?);
    }
    Ok(technicians)
}

pub fn get_technician(conn: &Connection, id: i64) -> anyhow::Result<Option<Technician>> {
    let technician = conn
        .query_row(
            &format!("SELECT {TECHNICIAN_COLUMNS} FROM technicians t WHERE t.id = ?1"),
            params![id],
            |row| parse_technician_row(row, 0),
        )
        .optional()?;
    Ok(technician)
}

/// Newest booking id per technician, counting cancelled bookings too.
pub fn last_booking_ids(conn: &Connection) -> anyhow::Result<HashMap<i64, i64>> {
    let mut stmt =
        conn.prepare("SELECT technician_id, MAX(id) FROM bookings GROUP BY technician_id")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))?;

    let mut last = HashMap::new();
    for row in rows {
        let (technician_id, booking_id) = row?;
        last.insert(technician_id, booking_id);
    }
    Ok(last)
}

fn parse_technician_row(row: &rusqlite::Row, offset: usize) -> rusqlite::Result<Technician> {
    Ok(Technician {
        id: row.get(offset)?,
        name: row.get(offset + 1)?,
        technician_type: row.get(offset + 2)?,
        working_hours_start: row.get(offset + 3)?,
        working_hours_end: row.get(offset + 4)?,
        is_active: row.get(offset + 5)?,
    })
}

// ── Bookings ──

pub fn insert_booking(
    conn: &Connection,
    technician_id: i64,
    booking_time: &NaiveDateTime,
    description: Option<&str>,
    now: &NaiveDateTime,
) -> anyhow::Result<i64> {
    let now = fmt_ts(now);
    conn.execute(
        "INSERT INTO bookings (technician_id, booking_time, description, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        params![
            technician_id,
            fmt_ts(booking_time),
            description,
            BookingStatus::Booked.as_str(),
            now,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_booking(conn: &Connection, id: i64) -> anyhow::Result<Option<Booking>> {
    let result = conn
        .query_row(
            &format!("SELECT {BOOKING_COLUMNS} FROM bookings b WHERE b.id = ?1"),
            params![id],
            |row| Ok(parse_booking_row(row)),
        )
        .optional()?;
    result.transpose()
}

pub fn get_booking_details(conn: &Connection, id: i64) -> anyhow::Result<Option<BookingDetails>> {
    let result = conn
        .query_row(
            &format!(
                "SELECT {BOOKING_COLUMNS}, {TECHNICIAN_COLUMNS}
                 FROM bookings b JOIN technicians t ON t.id = b.technician_id
                 WHERE b.id = ?1"
            ),
            params![id],
            |row| Ok(parse_details_row(row)),
        )
        .optional()?;
    result.transpose()
}

/// Active bookings of one technician whose start lies in `[from, to)`.
pub fn active_bookings_for_technician(
    conn: &Connection,
    technician_id: i64,
    from: &NaiveDateTime,
    to: &NaiveDateTime,
) -> anyhow::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings b
         WHERE b.technician_id = ?1 AND b.status = 'booked'
           AND b.booking_time >= ?2 AND b.booking_time < ?3
         ORDER BY b.booking_time ASC"
    ))?;

    let rows = stmt.query_map(params![technician_id, fmt_ts(from), fmt_ts(to)], |row| {
        Ok(parse_booking_row(row))
    })?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

pub fn list_active_booking_details(conn: &Connection) -> anyhow::Result<Vec<BookingDetails>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BOOKING_COLUMNS}, {TECHNICIAN_COLUMNS}
         FROM bookings b JOIN technicians t ON t.id = b.technician_id
         WHERE b.status = 'booked'
         ORDER BY b.booking_time ASC, b.id ASC"
    ))?;

    let rows = stmt.query_map([], |row| Ok(parse_details_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

pub fn update_booking_status(
    conn: &Connection,
    id: i64,
    status: BookingStatus,
    now: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status.as_str(), fmt_ts(now), id],
    )?;
    Ok(count > 0)
}

pub fn cancel_all_active(conn: &Connection, now: &NaiveDateTime) -> anyhow::Result<usize> {
    let count = conn.execute(
        "UPDATE bookings SET status = ?1, updated_at = ?2 WHERE status = ?3",
        params![
            BookingStatus::Cancelled.as_str(),
            fmt_ts(now),
            BookingStatus::Booked.as_str()
        ],
    )?;
    Ok(count)
}

fn parse_booking_row(row: &rusqlite::Row) -> anyhow::Result<Booking> {
    let booking_time: String = row.get(2)?;
    let status: String = row.get(4)?;
    let created_at: String = row.get(5)?;
    let updated_at: String = row.get(6)?;

    Ok(Booking {
        id: row.get(0)?,
        technician_id: row.get(1)?,
        booking_time: parse_ts(&booking_time)?,
        description: row.get(3)?,
        status: BookingStatus::parse(&status),
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}

fn parse_details_row(row: &rusqlite::Row) -> anyhow::Result<BookingDetails> {
    Ok(BookingDetails {
        booking: parse_booking_row(row)?,
        technician: parse_technician_row(row, 7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    #[test]
    fn test_booking_roundtrip_with_technician() {
        let conn = db::init_db(":memory:").unwrap();
        let tech = insert_technician(&conn, "Franky Flay", "Electrician", 9, 19, true).unwrap();
        let id = insert_booking(&conn, tech, &dt("2025-10-16 18:00"), Some("wiring"), &dt("2025-10-01 08:00"))
            .unwrap();

        let details = get_booking_details(&conn, id).unwrap().unwrap();
        assert_eq!(details.booking.booking_time, dt("2025-10-16 18:00"));
        assert_eq!(details.booking.status, BookingStatus::Booked);
        assert_eq!(details.technician.name, "Franky Flay");
        assert!(get_booking(&conn, id + 1).unwrap().is_none());
    }

    #[test]
    fn test_active_bookings_excludes_cancelled_and_other_days() {
        let conn = db::init_db(":memory:").unwrap();
        let tech = insert_technician(&conn, "Nicolas Woollett", "Plumber", 9, 17, true).unwrap();
        let now = dt("2025-10-01 08:00");
        let keep = insert_booking(&conn, tech, &dt("2025-10-15 10:00"), None, &now).unwrap();
        let dropped = insert_booking(&conn, tech, &dt("2025-10-15 12:00"), None, &now).unwrap();
        insert_booking(&conn, tech, &dt("2025-10-16 10:00"), None, &now).unwrap();
        update_booking_status(&conn, dropped, BookingStatus::Cancelled, &now).unwrap();

        let found =
            active_bookings_for_technician(&conn, tech, &dt("2025-10-15 00:00"), &dt("2025-10-16 00:00"))
                .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, keep);
    }

    #[test]
    fn test_last_booking_ids() {
        let conn = db::init_db(":memory:").unwrap();
        let a = insert_technician(&conn, "A", "Plumber", 9, 17, true).unwrap();
        let b = insert_technician(&conn, "B", "Plumber", 9, 17, true).unwrap();
        let now = dt("2025-10-01 08:00");
        insert_booking(&conn, a, &dt("2025-10-15 10:00"), None, &now).unwrap();
        let latest = insert_booking(&conn, a, &dt("2025-10-15 12:00"), None, &now).unwrap();

        let last = last_booking_ids(&conn).unwrap();
        assert_eq!(last.get(&a), Some(&latest));
        assert_eq!(last.get(&b), None);
    }
}
