use std::collections::HashMap;

use tracing::info;

use boatdaddy_db::models::{ActorRow, RideRow};
use boatdaddy_db::{Database, now_timestamp};
use boatdaddy_types::api::RideAddInput;
use boatdaddy_types::models::{Participant, Ride, Role, User};

use crate::error::ApiError;
use crate::session::RequestSession;
use crate::users::{self, UserLookup, parse_timestamp};

/// Starts a ride between `driver_id`'s DRIVER grant and `rider_id`'s RIDER
/// grant.
pub fn add(db: &Database, input: &RideAddInput) -> Result<Ride, ApiError> {
    let driver = actor_for(db, input.driver_id, Role::Driver)?;
    let rider = actor_for(db, input.rider_id, Role::Rider)?;

    let id = db.insert_ride(driver.id, rider.id, &now_timestamp())?;
    info!("Ride {} started: driver {} rider {}", id, input.driver_id, input.rider_id);

    get(db, id)?.ok_or_else(|| ApiError::Internal(anyhow::anyhow!("ride {} missing after insert", id)))
}

pub fn get(db: &Database, id: i64) -> Result<Option<Ride>, ApiError> {
    match db.get_ride(id)? {
        Some(row) => Ok(Some(hydrate(db, row, &mut HashMap::new())?)),
        None => Ok(None),
    }
}

/// Rides the caller may see: all of them for admins, otherwise only the
/// caller's own. Anonymous callers see none.
pub fn list(db: &Database, session: &RequestSession) -> Result<Vec<Ride>, ApiError> {
    let participant = if session.has_role(Role::Admin) {
        None
    } else {
        match session.user_id() {
            Some(user_id) => Some(user_id),
            None => return Ok(vec![]),
        }
    };

    let mut cache = HashMap::new();
    db.list_rides(participant)?
        .into_iter()
        .map(|row| hydrate(db, row, &mut cache))
        .collect()
}

pub fn visible_to(ride: &Ride, session: &RequestSession) -> bool {
    if session.has_role(Role::Admin) {
        return true;
    }
    session
        .user_id()
        .is_some_and(|id| ride.driver.user_id == id || ride.rider.user_id == id)
}

fn actor_for(db: &Database, user_id: i64, role: Role) -> Result<ActorRow, ApiError> {
    db.find_actor(user_id, role.as_str())?.ok_or_else(|| {
        ApiError::BadUserInput(format!(
            "No {} data for user ID '{}': That user may not exist, or have permission for the role of '{}'.",
            role.as_str().to_lowercase(),
            user_id,
            role
        ))
    })
}

fn hydrate(
    db: &Database,
    row: RideRow,
    cache: &mut HashMap<i64, Option<User>>,
) -> Result<Ride, ApiError> {
    Ok(Ride {
        id: row.id,
        started_at: parse_timestamp(&row.started_at, "started_at", row.id),
        ended_at: row
            .ended_at
            .as_deref()
            .map(|raw| parse_timestamp(raw, "ended_at", row.id)),
        driver: participant(db, row.driver, cache)?,
        rider: participant(db, row.rider, cache)?,
    })
}

fn participant(
    db: &Database,
    actor: ActorRow,
    cache: &mut HashMap<i64, Option<User>>,
) -> Result<Participant, ApiError> {
    let role = actor
        .role
        .parse::<Role>()
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("actor {}: {}", actor.id, e)))?;

    let user = match cache.get(&actor.user_id) {
        Some(user) => user.clone(),
        None => {
            let user = users::get(db, &UserLookup::Id(actor.user_id))?;
            cache.insert(actor.user_id, user.clone());
            user
        }
    };

    Ok(Participant {
        id: actor.id,
        user_id: actor.user_id,
        role,
        user,
    })
}
