use crate::models::{ActorRow, RideRow};
use crate::queries::OptionalExt;
use crate::Database;
use anyhow::Result;
use rusqlite::{Connection, Row};

const RIDE_SELECT: &str = "SELECT r.id, r.started_at, r.ended_at,
            d.id, d.user_id, d.role,
            c.id, c.user_id, c.role
     FROM rides r
     JOIN actors d ON d.id = r.driver_id
     JOIN actors c ON c.id = r.rider_id";

impl Database {
    /// Inserts a ride between two actor rows. Role checks happen in the caller.
    pub fn insert_ride(&self, driver_actor_id: i64, rider_actor_id: i64, started_at: &str) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO rides (driver_id, rider_id, started_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![driver_actor_id, rider_actor_id, started_at],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_ride(&self, id: i64) -> Result<Option<RideRow>> {
        self.with_conn(|conn| {
            let sql = format!("{} WHERE r.id = ?1", RIDE_SELECT);
            conn.query_row(&sql, [id], map_ride).optional()
        })
    }

    /// All rides, newest first. With `participant` set, only rides where that
    /// user is the driver or the rider.
    pub fn list_rides(&self, participant: Option<i64>) -> Result<Vec<RideRow>> {
        self.with_conn(|conn| query_rides(conn, participant))
    }
}

fn query_rides(conn: &Connection, participant: Option<i64>) -> Result<Vec<RideRow>> {
    let rows = match participant {
        Some(user_id) => {
            let sql = format!(
                "{} WHERE d.user_id = ?1 OR c.user_id = ?1 ORDER BY r.started_at DESC, r.id DESC",
                RIDE_SELECT
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], map_ride)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        }
        None => {
            let sql = format!("{} ORDER BY r.started_at DESC, r.id DESC", RIDE_SELECT);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], map_ride)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        }
    };

    Ok(rows)
}

fn map_ride(row: &Row<'_>) -> rusqlite::Result<RideRow> {
    Ok(RideRow {
        id: row.get(0)?,
        started_at: row.get(1)?,
        ended_at: row.get(2)?,
        driver: ActorRow {
            id: row.get(3)?,
            user_id: row.get(4)?,
            role: row.get(5)?,
        },
        rider: ActorRow {
            id: row.get(6)?,
            user_id: row.get(7)?,
            role: row.get(8)?,
        },
    })
}
