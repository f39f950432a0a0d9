use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
use chrono::{DateTime, NaiveDate, Utc};
use rand_core::OsRng;
use tracing::{debug, error, info, warn};

use boatdaddy_db::Database;
use boatdaddy_db::models::{
    ActorRow, BoundingBox, NewProfile, NewUser, ProfileRow, UniqueConflict, UserChanges, UserFilter,
    UserRow,
};
use boatdaddy_types::api::{UserAddInput, UserUpdateInput};
use boatdaddy_types::models::{DeleteResult, Profile, Role, User, UserList};
use boatdaddy_types::validation::{validate_email, validate_username};

use crate::error::ApiError;

pub const NEARBY_LIMIT: u32 = 25;
pub const PASSWORD_MIN_LEN: usize = 8;

/// How a single user is addressed. When several selectors are given the
/// first of id, username, email wins.
#[derive(Debug, Clone, PartialEq)]
pub enum UserLookup {
    Id(i64),
    Username(String),
    Email(String),
}

impl UserLookup {
    pub fn from_args(
        id: Option<i64>,
        username: Option<String>,
        email: Option<String>,
    ) -> Result<Self, ApiError> {
        match (id, username, email) {
            (Some(id), _, _) => Ok(Self::Id(id)),
            (None, Some(username), _) => Ok(Self::Username(username)),
            (None, None, Some(email)) => Ok(Self::Email(email)),
            (None, None, None) => Err(ApiError::BadUserInput(
                "Provide one of id, username or email".into(),
            )),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NearbyQuery {
    pub latitude: f64,
    pub longitude: f64,
    pub within: Option<f64>,
    pub bounds: Option<String>,
}

pub fn get(db: &Database, lookup: &UserLookup) -> Result<Option<User>, ApiError> {
    let row = match lookup {
        UserLookup::Id(id) => db.get_user_by_id(*id)?,
        UserLookup::Username(username) => db.get_user_by_username(username)?,
        UserLookup::Email(email) => db.get_user_by_email(email)?,
    };

    match row {
        Some(row) => {
            let actors = db.get_actors_for_user(row.id)?;
            Ok(Some(attach_roles(row, &actors)))
        }
        None => Ok(None),
    }
}

pub fn list_all(db: &Database) -> Result<UserList, ApiError> {
    let users = hydrate(db, db.list_users(&UserFilter::default())?)?;
    Ok(UserList { users, pages: 1 })
}

pub fn list(db: &Database, is_boat_daddy: Option<bool>, role: Option<Role>) -> Result<UserList, ApiError> {
    let filter = UserFilter {
        is_boat_daddy,
        role: role.map(|r| r.as_str().to_string()),
        ..Default::default()
    };
    let users = hydrate(db, db.list_users(&filter)?)?;
    Ok(UserList { users, pages: 1 })
}

/// Boat daddies near a point, never including the requester.
pub fn get_nearby(db: &Database, query: &NearbyQuery, requester: Option<i64>) -> Result<Vec<User>, ApiError> {
    debug!(
        "Nearby search at ({}, {}) within {:?} bounds {:?}",
        query.latitude, query.longitude, query.within, query.bounds
    );

    let bounds = query.bounds.as_deref().map(parse_bounds).transpose()?;
    if bounds.is_none() {
        warn!("Nearby search without bounds; returning boat daddies from anywhere");
    }

    let filter = UserFilter {
        is_boat_daddy: Some(true),
        bounds,
        exclude_user_id: requester,
        limit: Some(NEARBY_LIMIT),
        ..Default::default()
    };
    hydrate(db, db.list_users(&filter)?)
}

/// Parses `[[lng0,lat0],[lng1,lat1]]` into an inclusive box.
pub fn parse_bounds(raw: &str) -> Result<BoundingBox, ApiError> {
    let [[lng0, lat0], [lng1, lat1]]: [[f64; 2]; 2] = serde_json::from_str(raw).map_err(|e| {
        ApiError::BadUserInput(format!(
            "Invalid bounds '{}': expected [[lng0,lat0],[lng1,lat1]] ({})",
            raw, e
        ))
    })?;

    Ok(BoundingBox {
        min_latitude: lat0,
        max_latitude: lat1,
        min_longitude: lng0,
        max_longitude: lng1,
    })
}

pub fn add(db: &Database, input: UserAddInput) -> Result<User, ApiError> {
    validate_username(&input.username)?;
    validate_email(&input.email)?;
    ensure_available(db, None, Some(&input.username), Some(&input.email))?;

    let password = match input.password.as_deref() {
        Some(password) => Some(hash_password(password)?),
        None => None,
    };

    let new_user = NewUser {
        id: None,
        username: input.username,
        email: input.email,
        image: input.image,
        password,
        profile: NewProfile {
            name: Some(input.name),
            is_boat_daddy: false,
            ..Default::default()
        },
        roles: vec![Role::Rider.as_str().to_string()],
    };
    let user_id = db
        .create_user(&new_user)
        .map_err(|e| write_error(e, Some(&new_user.username), Some(&new_user.email)))?;
    info!("Created user {}", user_id);

    get(db, &UserLookup::Id(user_id))?
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("user {} missing after insert", user_id)))
}

/// Partial update. `None` when the user does not exist.
pub fn update(db: &Database, id: i64, input: UserUpdateInput) -> Result<Option<User>, ApiError> {
    if db.get_user_by_id(id)?.is_none() {
        return Ok(None);
    }
    if let Some(username) = &input.username {
        validate_username(username)?;
    }
    if let Some(email) = &input.email {
        validate_email(email)?;
    }
    ensure_available(db, Some(id), input.username.as_deref(), input.email.as_deref())?;

    let changes = UserChanges {
        username: input.username,
        email: input.email,
        image: input.image,
        latitude: input.latitude,
        longitude: input.longitude,
        name: input.name,
        bio: input.bio,
        about_boat: input.about_boat,
        boat_name: input.boat_name,
        boat_image: input.boat_image,
        birthday: input.birthday.map(|d| d.format("%Y-%m-%d").to_string()),
        is_boat_daddy: input.is_boat_daddy,
    };

    let updated = db
        .update_user(id, &changes)
        .map_err(|e| write_error(e, changes.username.as_deref(), changes.email.as_deref()))?;
    if !updated {
        return Ok(None);
    }
    debug!("Updated user {}", id);

    get(db, &UserLookup::Id(id))
}

pub fn delete(db: &Database, id: i64) -> Result<DeleteResult, ApiError> {
    let deleted = db.delete_user(id)?;
    if deleted == 0 {
        return Ok(DeleteResult {
            success: false,
            number_deleted: 0,
            message: Some(format!("No user with ID '{}'", id)),
        });
    }

    info!("Deleted user {}", id);
    Ok(DeleteResult {
        success: true,
        number_deleted: deleted as i64,
        message: None,
    })
}

/// Resets the store to the mock user. Failures are reported in the result.
pub fn seed(db: &Database) -> DeleteResult {
    match db.seed() {
        Ok(outcome) => DeleteResult {
            success: true,
            number_deleted: outcome.deleted as i64,
            message: Some(format!(
                "Deleted all {} users and inserted mock user {}",
                outcome.deleted, outcome.user_id
            )),
        },
        Err(e) => {
            error!("Seed failed: {:#}", e);
            DeleteResult {
                success: false,
                number_deleted: 0,
                message: Some(format!("Seed failed: {}", e)),
            }
        }
    }
}

/// Flattens the user's actor rows into `roles`. Rows for other users are
/// ignored.
pub fn attach_roles(row: UserRow, actors: &[ActorRow]) -> User {
    let roles = actors
        .iter()
        .filter(|actor| actor.user_id == row.id)
        .filter_map(|actor| match actor.role.parse::<Role>() {
            Ok(role) => Some(role),
            Err(e) => {
                warn!("Skipping actor {} on user {}: {}", actor.id, row.id, e);
                None
            }
        })
        .collect();

    let created_at = parse_timestamp(&row.created_at, "created_at", row.id);
    let updated_at = parse_timestamp(&row.updated_at, "updated_at", row.id);
    let profile = row.profile.map(|p| profile_from_row(p, row.id));

    User {
        id: row.id,
        username: row.username,
        email: row.email,
        image: row.image,
        latitude: row.latitude,
        longitude: row.longitude,
        created_at,
        updated_at,
        profile,
        roles,
    }
}

pub(crate) fn hydrate(db: &Database, rows: Vec<UserRow>) -> Result<Vec<User>, ApiError> {
    let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    let actors = db.get_actors_for_users(&ids)?;

    Ok(rows.into_iter().map(|row| attach_roles(row, &actors)).collect())
}

fn profile_from_row(row: ProfileRow, user_id: i64) -> Profile {
    let birthday = row.birthday.as_deref().and_then(|raw| {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map_err(|e| warn!("Corrupt birthday '{}' on user {}: {}", raw, user_id, e))
            .ok()
    });

    Profile {
        created_at: parse_timestamp(&row.created_at, "profile created_at", user_id),
        updated_at: parse_timestamp(&row.updated_at, "profile updated_at", user_id),
        name: row.name,
        bio: row.bio,
        about_boat: row.about_boat,
        boat_name: row.boat_name,
        boat_image: row.boat_image,
        birthday,
        is_boat_daddy: row.is_boat_daddy,
    }
}

pub(crate) fn parse_timestamp(raw: &str, column: &str, id: i64) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite's CURRENT_TIMESTAMP format
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt {} '{}' on row {}: {}", column, raw, id, e);
            DateTime::default()
        })
}

fn ensure_available(
    db: &Database,
    current_id: Option<i64>,
    username: Option<&str>,
    email: Option<&str>,
) -> Result<(), ApiError> {
    let taken_by_other = |row: Option<UserRow>| row.is_some_and(|r| Some(r.id) != current_id);

    if let Some(username) = username {
        if taken_by_other(db.get_user_by_username(username)?) {
            return Err(taken(UniqueConflict::Username, username));
        }
    }
    if let Some(email) = email {
        if taken_by_other(db.get_user_by_email(email)?) {
            return Err(taken(UniqueConflict::Email, email));
        }
    }
    Ok(())
}

/// A write that lost a race for a username or email is still an input error.
fn write_error(e: anyhow::Error, username: Option<&str>, email: Option<&str>) -> ApiError {
    match e.downcast_ref::<UniqueConflict>() {
        Some(UniqueConflict::Username) => taken(UniqueConflict::Username, username.unwrap_or_default()),
        Some(UniqueConflict::Email) => taken(UniqueConflict::Email, email.unwrap_or_default()),
        None => ApiError::Internal(e),
    }
}

fn taken(conflict: UniqueConflict, value: &str) -> ApiError {
    match conflict {
        UniqueConflict::Username => ApiError::BadUserInput(format!("Username '{}' is already taken", value)),
        UniqueConflict::Email => ApiError::BadUserInput(format!("Email '{}' is already registered", value)),
    }
}

fn hash_password(password: &str) -> Result<String, ApiError> {
    if password.chars().count() < PASSWORD_MIN_LEN {
        return Err(ApiError::BadUserInput(
            "Password must be at least eight characters long".into(),
        ));
    }

    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("password hashing failed: {}", e)))?
        .to_string();

    Ok(hash)
}
