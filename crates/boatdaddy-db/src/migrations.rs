use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            username    TEXT NOT NULL UNIQUE,
            email       TEXT NOT NULL UNIQUE,
            image       TEXT,
            latitude    REAL,
            longitude   REAL,
            password    TEXT,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_users_location
            ON users(latitude, longitude);

        CREATE TABLE IF NOT EXISTS profiles (
            user_id         INTEGER PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
            name            TEXT,
            bio             TEXT,
            about_boat      TEXT,
            boat_name       TEXT,
            boat_image      TEXT,
            birthday        TEXT,
            is_boat_daddy   INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_profiles_boat_daddy
            ON profiles(is_boat_daddy);

        CREATE TABLE IF NOT EXISTS actors (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            role        TEXT NOT NULL CHECK (role IN ('RIDER', 'DRIVER', 'ADMIN')),
            UNIQUE(user_id, role)
        );

        CREATE TABLE IF NOT EXISTS rides (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            driver_id   INTEGER NOT NULL REFERENCES actors(id) ON DELETE CASCADE,
            rider_id    INTEGER NOT NULL REFERENCES actors(id) ON DELETE CASCADE,
            started_at  TEXT NOT NULL,
            ended_at    TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_rides_driver ON rides(driver_id);
        CREATE INDEX IF NOT EXISTS idx_rides_rider ON rides(rider_id);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
