use crate::models::{ActorRow, NewUser, ProfileRow, UniqueConflict, UserChanges, UserFilter, UserRow};
use crate::{Database, now_timestamp};
use anyhow::Result;
use rusqlite::types::Value;
use rusqlite::{Connection, ErrorCode, Row};

/// Ids bound per `IN (...)` lookup, well under SQLite's variable limit.
pub const ID_BATCH_SIZE: usize = 500;

const USER_SELECT: &str = "SELECT u.id, u.username, u.email, u.image, u.latitude, u.longitude,
            u.password, u.created_at, u.updated_at,
            p.user_id, p.name, p.bio, p.about_boat, p.boat_name, p.boat_image,
            p.birthday, p.is_boat_daddy, p.created_at, p.updated_at
     FROM users u
     LEFT JOIN profiles p ON p.user_id = u.id";

impl Database {
    // -- Users --

    /// Inserts the user, its profile and its role grants in one transaction.
    /// Returns the new user id.
    pub fn create_user(&self, user: &NewUser) -> Result<i64> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let now = now_timestamp();

            tx.execute(
                "INSERT INTO users (id, username, email, image, password, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                rusqlite::params![user.id, user.username, user.email, user.image, user.password, now],
            )
            .map_err(unique_conflict)?;
            let user_id = tx.last_insert_rowid();

            let profile = &user.profile;
            tx.execute(
                "INSERT INTO profiles (user_id, name, bio, about_boat, boat_name, boat_image,
                                       birthday, is_boat_daddy, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
                rusqlite::params![
                    user_id,
                    profile.name,
                    profile.bio,
                    profile.about_boat,
                    profile.boat_name,
                    profile.boat_image,
                    profile.birthday,
                    profile.is_boat_daddy,
                    now
                ],
            )?;

            for role in &user.roles {
                insert_role(&tx, user_id, role)?;
            }

            tx.commit()?;
            Ok(user_id)
        })
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "u.id = ?1", Value::Integer(id)))
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "u.username = ?1", Value::Text(username.to_string())))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "u.email = ?1", Value::Text(email.to_string())))
    }

    pub fn list_users(&self, filter: &UserFilter) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| query_users(conn, filter))
    }

    /// Applies a partial update. Returns `false` when no such user exists.
    pub fn update_user(&self, id: i64, changes: &UserChanges) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let now = now_timestamp();

            let updated = tx.execute(
                "UPDATE users SET
                    username   = COALESCE(?2, username),
                    email      = COALESCE(?3, email),
                    image      = COALESCE(?4, image),
                    latitude   = COALESCE(?5, latitude),
                    longitude  = COALESCE(?6, longitude),
                    updated_at = ?7
                 WHERE id = ?1",
                rusqlite::params![
                    id,
                    changes.username,
                    changes.email,
                    changes.image,
                    changes.latitude,
                    changes.longitude,
                    now
                ],
            )
            .map_err(unique_conflict)?;
            if updated == 0 {
                return Ok(false);
            }

            if changes.touches_profile() {
                // Users created before profiles existed get one on first edit
                tx.execute(
                    "INSERT INTO profiles (user_id, created_at, updated_at) VALUES (?1, ?2, ?2)
                     ON CONFLICT(user_id) DO NOTHING",
                    rusqlite::params![id, now],
                )?;
                tx.execute(
                    "UPDATE profiles SET
                        name          = COALESCE(?2, name),
                        bio           = COALESCE(?3, bio),
                        about_boat    = COALESCE(?4, about_boat),
                        boat_name     = COALESCE(?5, boat_name),
                        boat_image    = COALESCE(?6, boat_image),
                        birthday      = COALESCE(?7, birthday),
                        is_boat_daddy = COALESCE(?8, is_boat_daddy),
                        updated_at    = ?9
                     WHERE user_id = ?1",
                    rusqlite::params![
                        id,
                        changes.name,
                        changes.bio,
                        changes.about_boat,
                        changes.boat_name,
                        changes.boat_image,
                        changes.birthday,
                        changes.is_boat_daddy,
                        now
                    ],
                )?;
            }

            tx.commit()?;
            Ok(true)
        })
    }

    /// Deletes the user; profile, actors and their rides go with it.
    /// Returns the number of user rows removed.
    pub fn delete_user(&self, id: i64) -> Result<usize> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM users WHERE id = ?1", [id])?))
    }

    // -- Actors --

    /// The actor row granting `role` to `user_id`, if the grant exists.
    pub fn find_actor(&self, user_id: i64, role: &str) -> Result<Option<ActorRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, user_id, role FROM actors WHERE user_id = ?1 AND role = ?2",
                rusqlite::params![user_id, role],
                map_actor,
            )
            .optional()
        })
    }

    pub fn get_actors_for_user(&self, user_id: i64) -> Result<Vec<ActorRow>> {
        self.get_actors_for_users(&[user_id])
    }

    /// Batch-fetch role grants for a set of user IDs, [`ID_BATCH_SIZE`] ids
    /// per query.
    pub fn get_actors_for_users(&self, user_ids: &[i64]) -> Result<Vec<ActorRow>> {
        if user_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let mut rows = Vec::new();
            for chunk in user_ids.chunks(ID_BATCH_SIZE) {
                let placeholders: Vec<String> = (1..=chunk.len()).map(|i| format!("?{}", i)).collect();
                let sql = format!(
                    "SELECT id, user_id, role FROM actors WHERE user_id IN ({}) ORDER BY user_id, id",
                    placeholders.join(", ")
                );

                let mut stmt = conn.prepare(&sql)?;
                let batch = stmt
                    .query_map(rusqlite::params_from_iter(chunk.iter()), map_actor)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                rows.extend(batch);
            }

            Ok(rows)
        })
    }
}

pub(crate) fn insert_role(conn: &Connection, user_id: i64, role: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO actors (user_id, role) VALUES (?1, ?2)
         ON CONFLICT(user_id, role) DO NOTHING",
        rusqlite::params![user_id, role],
    )?;
    Ok(())
}

/// Tags a UNIQUE violation on `users.username` or `users.email` so callers
/// can tell a taken name from a storage failure.
fn unique_conflict(e: rusqlite::Error) -> anyhow::Error {
    if let rusqlite::Error::SqliteFailure(failure, Some(message)) = &e {
        if failure.code == ErrorCode::ConstraintViolation {
            if message.contains("users.username") {
                return UniqueConflict::Username.into();
            }
            if message.contains("users.email") {
                return UniqueConflict::Email.into();
            }
        }
    }
    e.into()
}

fn query_user(conn: &Connection, predicate: &str, value: Value) -> Result<Option<UserRow>> {
    let sql = format!("{} WHERE {}", USER_SELECT, predicate);
    let mut stmt = conn.prepare(&sql)?;

    stmt.query_row([value], map_user).optional()
}

fn query_users(conn: &Connection, filter: &UserFilter) -> Result<Vec<UserRow>> {
    let mut clauses: Vec<&str> = Vec::new();
    let mut params: Vec<Value> = Vec::new();

    match filter.is_boat_daddy {
        Some(true) => clauses.push("p.is_boat_daddy = 1"),
        Some(false) => clauses.push("COALESCE(p.is_boat_daddy, 0) = 0"),
        None => {}
    }
    if let Some(role) = &filter.role {
        clauses.push("EXISTS (SELECT 1 FROM actors a WHERE a.user_id = u.id AND a.role = ?)");
        params.push(Value::Text(role.clone()));
    }
    if let Some(bounds) = filter.bounds {
        clauses.push("u.latitude >= ? AND u.latitude <= ?");
        params.push(Value::Real(bounds.min_latitude));
        params.push(Value::Real(bounds.max_latitude));
        clauses.push("u.longitude >= ? AND u.longitude <= ?");
        params.push(Value::Real(bounds.min_longitude));
        params.push(Value::Real(bounds.max_longitude));
    }
    if let Some(id) = filter.exclude_user_id {
        clauses.push("u.id != ?");
        params.push(Value::Integer(id));
    }

    let mut sql = USER_SELECT.to_string();
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY u.id");
    if let Some(limit) = filter.limit {
        sql.push_str(" LIMIT ?");
        params.push(Value::Integer(i64::from(limit)));
    }

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(params.iter()), map_user)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    let profile_user_id: Option<i64> = row.get(9)?;
    let profile = match profile_user_id {
        Some(_) => Some(ProfileRow {
            name: row.get(10)?,
            bio: row.get(11)?,
            about_boat: row.get(12)?,
            boat_name: row.get(13)?,
            boat_image: row.get(14)?,
            birthday: row.get(15)?,
            is_boat_daddy: row.get(16)?,
            created_at: row.get(17)?,
            updated_at: row.get(18)?,
        }),
        None => None,
    };

    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        image: row.get(3)?,
        latitude: row.get(4)?,
        longitude: row.get(5)?,
        password: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
        profile,
    })
}

pub(crate) fn map_actor(row: &Row<'_>) -> rusqlite::Result<ActorRow> {
    Ok(ActorRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        role: row.get(2)?,
    })
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BoundingBox, NewProfile};

    fn new_user(username: &str, boat_daddy: bool, roles: &[&str]) -> NewUser {
        NewUser {
            username: username.to_string(),
            email: format!("{}@boatdaddy.app", username),
            profile: NewProfile {
                name: Some(username.to_uppercase()),
                is_boat_daddy: boat_daddy,
                ..Default::default()
            },
            roles: roles.iter().map(|r| r.to_string()).collect(),
            ..Default::default()
        }
    }

    fn place(db: &Database, id: i64, latitude: f64, longitude: f64) {
        let changes = UserChanges {
            latitude: Some(latitude),
            longitude: Some(longitude),
            ..Default::default()
        };
        assert!(db.update_user(id, &changes).unwrap());
    }

    #[test]
    fn create_and_fetch_user_with_profile() {
        let db = Database::open_in_memory().unwrap();
        let id = db.create_user(&new_user("skipper", false, &["RIDER"])).unwrap();

        let by_id = db.get_user_by_id(id).unwrap().unwrap();
        assert_eq!(by_id.username, "skipper");
        let profile = by_id.profile.unwrap();
        assert_eq!(profile.name.as_deref(), Some("SKIPPER"));
        assert!(!profile.is_boat_daddy);

        assert_eq!(db.get_user_by_username("skipper").unwrap().unwrap().id, id);
        assert_eq!(db.get_user_by_email("skipper@boatdaddy.app").unwrap().unwrap().id, id);
        assert!(db.get_user_by_username("nobody").unwrap().is_none());
    }

    #[test]
    fn duplicate_username_is_rejected_and_rolled_back() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(&new_user("skipper", false, &[])).unwrap();

        let mut dup = new_user("skipper", false, &[]);
        dup.email = "other@boatdaddy.app".into();
        let err = db.create_user(&dup).unwrap_err();
        assert_eq!(err.downcast_ref::<UniqueConflict>(), Some(&UniqueConflict::Username));
        assert!(db.get_user_by_email("other@boatdaddy.app").unwrap().is_none());

        let mut dup = new_user("other", false, &[]);
        dup.email = "skipper@boatdaddy.app".into();
        let err = db.create_user(&dup).unwrap_err();
        assert_eq!(err.downcast_ref::<UniqueConflict>(), Some(&UniqueConflict::Email));
    }

    #[test]
    fn update_into_a_taken_name_is_a_conflict() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(&new_user("skipper", false, &[])).unwrap();
        let other = db.create_user(&new_user("deckhand", false, &[])).unwrap();

        let changes = UserChanges {
            username: Some("skipper".into()),
            ..Default::default()
        };
        let err = db.update_user(other, &changes).unwrap_err();
        assert_eq!(err.downcast_ref::<UniqueConflict>(), Some(&UniqueConflict::Username));
        assert_eq!(db.get_user_by_id(other).unwrap().unwrap().username, "deckhand");
    }

    #[test]
    fn filter_by_flag_and_role() {
        let db = Database::open_in_memory().unwrap();
        let a = db.create_user(&new_user("alpha", true, &["DRIVER"])).unwrap();
        let b = db.create_user(&new_user("bravo", false, &["DRIVER"])).unwrap();
        let c = db.create_user(&new_user("charlie", true, &["RIDER"])).unwrap();

        let daddies = db
            .list_users(&UserFilter { is_boat_daddy: Some(true), ..Default::default() })
            .unwrap();
        assert_eq!(daddies.iter().map(|u| u.id).collect::<Vec<_>>(), vec![a, c]);

        let others = db
            .list_users(&UserFilter { is_boat_daddy: Some(false), ..Default::default() })
            .unwrap();
        assert_eq!(others.iter().map(|u| u.id).collect::<Vec<_>>(), vec![b]);

        let drivers = db
            .list_users(&UserFilter { role: Some("DRIVER".into()), ..Default::default() })
            .unwrap();
        assert_eq!(drivers.iter().map(|u| u.id).collect::<Vec<_>>(), vec![a, b]);
    }

    #[test]
    fn bounds_are_inclusive_and_exclusion_applies() {
        let db = Database::open_in_memory().unwrap();
        let edge = db.create_user(&new_user("edge", true, &[])).unwrap();
        let inside = db.create_user(&new_user("inside", true, &[])).unwrap();
        let outside = db.create_user(&new_user("outside", true, &[])).unwrap();
        let me = db.create_user(&new_user("myself", true, &[])).unwrap();
        let unplaced = db.create_user(&new_user("unplaced", true, &[])).unwrap();
        place(&db, edge, 40.0, -75.0);
        place(&db, inside, 40.7, -74.0);
        place(&db, outside, 42.0, -74.0);
        place(&db, me, 40.5, -74.5);

        let filter = UserFilter {
            is_boat_daddy: Some(true),
            bounds: Some(BoundingBox {
                min_latitude: 40.0,
                max_latitude: 41.0,
                min_longitude: -75.0,
                max_longitude: -73.0,
            }),
            exclude_user_id: Some(me),
            limit: Some(25),
            ..Default::default()
        };
        let ids: Vec<i64> = db.list_users(&filter).unwrap().iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![edge, inside]);
        assert!(!ids.contains(&outside));
        assert!(!ids.contains(&unplaced));
    }

    #[test]
    fn limit_caps_results() {
        let db = Database::open_in_memory().unwrap();
        for i in 0..5 {
            db.create_user(&new_user(&format!("user{}", i), true, &[])).unwrap();
        }
        let rows = db
            .list_users(&UserFilter { limit: Some(3), ..Default::default() })
            .unwrap();
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn partial_update_keeps_untouched_columns() {
        let db = Database::open_in_memory().unwrap();
        let id = db.create_user(&new_user("skipper", false, &[])).unwrap();

        let changes = UserChanges {
            bio: Some("Sails a lot".into()),
            is_boat_daddy: Some(true),
            ..Default::default()
        };
        assert!(db.update_user(id, &changes).unwrap());

        let row = db.get_user_by_id(id).unwrap().unwrap();
        assert_eq!(row.email, "skipper@boatdaddy.app");
        let profile = row.profile.unwrap();
        assert_eq!(profile.name.as_deref(), Some("SKIPPER"));
        assert_eq!(profile.bio.as_deref(), Some("Sails a lot"));
        assert!(profile.is_boat_daddy);

        assert!(!db.update_user(9999, &changes).unwrap());
    }

    #[test]
    fn delete_cascades_to_profile_and_actors() {
        let db = Database::open_in_memory().unwrap();
        let id = db.create_user(&new_user("skipper", true, &["RIDER", "DRIVER"])).unwrap();
        assert_eq!(db.get_actors_for_user(id).unwrap().len(), 2);

        assert_eq!(db.delete_user(id).unwrap(), 1);
        assert!(db.get_user_by_id(id).unwrap().is_none());
        assert!(db.get_actors_for_user(id).unwrap().is_empty());
        assert_eq!(db.delete_user(id).unwrap(), 0);
    }

    #[test]
    fn grants_are_unique_per_role() {
        let db = Database::open_in_memory().unwrap();
        let id = db
            .create_user(&new_user("skipper", false, &["RIDER", "RIDER", "DRIVER"]))
            .unwrap();

        let roles: Vec<String> = db
            .get_actors_for_user(id)
            .unwrap()
            .into_iter()
            .map(|a| a.role)
            .collect();
        assert_eq!(roles, vec!["RIDER".to_string(), "DRIVER".to_string()]);

        assert!(db.find_actor(id, "DRIVER").unwrap().is_some());
        assert!(db.find_actor(id, "ADMIN").unwrap().is_none());
        assert!(db.create_user(&new_user("pirate", false, &["CAPTAIN"])).is_err());
        assert!(db.get_user_by_username("pirate").unwrap().is_none());
    }

    #[test]
    fn actor_lookup_spans_several_batches() {
        let db = Database::open_in_memory().unwrap();
        let count = ID_BATCH_SIZE * 2 + 7;
        let ids: Vec<i64> = (0..count)
            .map(|i| db.create_user(&new_user(&format!("sailor{}", i), false, &["RIDER"])).unwrap())
            .collect();

        let actors = db.get_actors_for_users(&ids).unwrap();
        assert_eq!(actors.len(), count);
        assert_eq!(actors.first().unwrap().user_id, ids[0]);
        assert_eq!(actors.last().unwrap().user_id, ids[count - 1]);
    }
}
