use crate::queries::insert_role;
use crate::Database;
use anyhow::Result;
use tracing::info;

pub const MOCK_USER_ID: i64 = 1;
pub const MOCK_USER_USERNAME: &str = "john_daddy";
pub const MOCK_USER_EMAIL: &str = "john_daddy@boatdaddy.app";
pub const MOCK_USER_ROLES: [&str; 3] = ["RIDER", "DRIVER", "ADMIN"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedOutcome {
    /// Users removed before the mock user was written.
    pub deleted: usize,
    pub user_id: i64,
}

impl Database {
    /// Wipes every user (and with them profiles, actors and rides) and writes
    /// the fixed mock user. Running it again leaves the same single user.
    pub fn seed(&self) -> Result<SeedOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            tx.execute("DELETE FROM rides", [])?;
            tx.execute("DELETE FROM actors", [])?;
            tx.execute("DELETE FROM profiles", [])?;
            let deleted = tx.execute("DELETE FROM users", [])?;

            let created = "2021-07-01T00:00:00.000Z";
            let updated = "2021-07-02T00:00:00.000Z";
            tx.execute(
                "INSERT INTO users (id, username, email, image, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    MOCK_USER_ID,
                    MOCK_USER_USERNAME,
                    MOCK_USER_EMAIL,
                    "cloudinaryPublicId=hero_redshortsdaddy_khqgav",
                    created,
                    updated
                ],
            )?;
            let user_id = tx.last_insert_rowid();

            tx.execute(
                "INSERT INTO profiles (user_id, name, bio, about_boat, boat_name, boat_image,
                                       birthday, is_boat_daddy, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, ?8, ?8)",
                rusqlite::params![
                    user_id,
                    "John Daddy",
                    "Get your towels ready because it's about to go down",
                    "Take a good long look at this boat",
                    "USS Daddy",
                    "cloudinaryPublicId=damian-barczak-p-GrqI8OSqI-unsplash_fnv5lo",
                    "1980-01-01",
                    created
                ],
            )?;

            for role in MOCK_USER_ROLES {
                insert_role(&tx, user_id, role)?;
            }

            tx.commit()?;

            info!("Seeded mock user {} after deleting {} users", user_id, deleted);
            Ok(SeedOutcome { deleted, user_id })
        })
    }
}
