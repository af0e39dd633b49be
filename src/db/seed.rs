use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::Connection;

use super::queries;

struct SeedTechnician {
    name: &'static str,
    technician_type: &'static str,
    working_hours_start: u32,
    working_hours_end: u32,
    booking: (i32, u32, u32, u32),
}

const DEMO_TECHNICIANS: &[SeedTechnician] = &[
    SeedTechnician {
        name: "Nicolas Woollett",
        technician_type: "Plumber",
        working_hours_start: 9,
        working_hours_end: 17,
        booking: (2025, 10, 15, 10),
    },
    SeedTechnician {
        name: "Franky Flay",
        technician_type: "Electrician",
        working_hours_start: 9,
        working_hours_end: 19,
        booking: (2025, 10, 16, 18),
    },
    SeedTechnician {
        name: "Griselda Dickson",
        technician_type: "Welder",
        working_hours_start: 8,
        working_hours_end: 16,
        booking: (2025, 10, 18, 11),
    },
];

/// Insert the demo technicians and one booking each, unless technicians already exist.
/// Returns whether anything was written.
pub fn seed_if_empty(conn: &Connection, now: &NaiveDateTime) -> anyhow::Result<bool> {
    if queries::count_technicians(conn)? > 0 {
        tracing::info!("database already has technicians, skipping seed");
        return Ok(false);
    }

    let tx = conn.unchecked_transaction()?;
    for seed in DEMO_TECHNICIANS {
        let id = queries::insert_technician(
            &tx,
            seed.name,
            seed.technician_type,
            seed.working_hours_start,
            seed.working_hours_end,
            true,
        )?;

        let (y, m, d, h) = seed.booking;
        let booking_time = NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|date| date.and_hms_opt(h, 0, 0))
            .ok_or_else(|| anyhow::anyhow!("invalid seed booking time for {}", seed.name))?;
        let description = format!("Initial booking for {}", seed.technician_type);
        queries::insert_booking(&tx, id, &booking_time, Some(&description), now)?;
    }
    tx.commit()?;

    tracing::info!(technicians = DEMO_TECHNICIANS.len(), "seeded demo data");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    #[test]
    fn test_seed_only_once() {
        let conn = db::init_db(":memory:").unwrap();
        let now = NaiveDate::from_ymd_opt(2025, 10, 1).unwrap().and_hms_opt(8, 0, 0).unwrap();

        assert!(seed_if_empty(&conn, &now).unwrap());
        assert!(!seed_if_empty(&conn, &now).unwrap());

        assert_eq!(queries::count_technicians(&conn).unwrap(), 3);
        assert_eq!(queries::list_active_booking_details(&conn).unwrap().len(), 3);
    }
}
