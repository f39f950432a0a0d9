//! GraphQL schema: query and mutation roots merged from per-domain objects.
//!
//! The database handle and image signer are schema data, fixed at startup.
//! The caller's [`RequestSession`] is request data, attached by the HTTP
//! handler for every request.

use std::sync::Arc;

use async_graphql::{Context, EmptySubscription, MergedObject, Object, Schema};
use tracing::debug;

use boatdaddy_db::Database;
use boatdaddy_types::api::{RideAddInput, Session, UserAddInput, UserUpdateInput};
use boatdaddy_types::models::{DeleteResult, ImageSignature, Profile, Ride, Role, User, UserList};

use crate::error::{ApiError, gql};
use crate::images::ImageSigner;
use crate::run_blocking;
use crate::session::RequestSession;
use crate::users::{NearbyQuery, UserLookup};
use crate::{rides, users};

pub const ABOUT: &str = "Boat Daddy API 1.0";

pub type BoatSchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

#[derive(MergedObject, Default)]
pub struct QueryRoot(MetaQuery, UserQuery, RideQuery);

#[derive(MergedObject, Default)]
pub struct MutationRoot(ImageMutation, UserMutation, RideMutation);

pub fn build_schema(db: Arc<Database>, signer: ImageSigner) -> BoatSchema {
    Schema::build(QueryRoot::default(), MutationRoot::default(), EmptySubscription)
        .data(db)
        .data(signer)
        .finish()
}

fn session(ctx: &Context<'_>) -> RequestSession {
    ctx.data_opt::<RequestSession>().cloned().unwrap_or_default()
}

async fn blocking<F, T>(ctx: &Context<'_>, f: F) -> async_graphql::Result<T>
where
    F: FnOnce(&Database) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let db = ctx.data::<Arc<Database>>()?;
    gql(run_blocking(db, f).await)
}

// -- Queries --

#[derive(Default)]
pub struct MetaQuery;

#[Object]
impl MetaQuery {
    async fn about(&self) -> String {
        ABOUT.to_string()
    }

    /// The caller's session, or null when anonymous.
    async fn auth(&self, ctx: &Context<'_>) -> Option<Session> {
        session(ctx).0
    }
}

#[derive(Default)]
pub struct UserQuery;

#[Object]
impl UserQuery {
    async fn profile(&self, ctx: &Context<'_>, username: String) -> async_graphql::Result<Option<Profile>> {
        let user = blocking(ctx, move |db| users::get(db, &UserLookup::Username(username))).await?;
        Ok(user.and_then(|u| u.profile))
    }

    async fn user(
        &self,
        ctx: &Context<'_>,
        id: Option<i64>,
        username: Option<String>,
        email: Option<String>,
    ) -> async_graphql::Result<Option<User>> {
        let lookup = gql(UserLookup::from_args(id, username, email))?;
        debug!("user lookup {:?}", lookup);
        blocking(ctx, move |db| users::get(db, &lookup)).await
    }

    async fn users(&self, ctx: &Context<'_>) -> async_graphql::Result<UserList> {
        blocking(ctx, users::list_all).await
    }

    async fn user_list(
        &self,
        ctx: &Context<'_>,
        is_boat_daddy: Option<bool>,
        role: Option<Role>,
    ) -> async_graphql::Result<UserList> {
        blocking(ctx, move |db| users::list(db, is_boat_daddy, role)).await
    }

    /// Boat daddies inside `bounds`, a JSON `[[lng0,lat0],[lng1,lat1]]` box.
    async fn nearby_drivers(
        &self,
        ctx: &Context<'_>,
        latitude: f64,
        longitude: f64,
        within: Option<f64>,
        bounds: Option<String>,
    ) -> async_graphql::Result<Vec<User>> {
        let requester = session(ctx).user_id();
        let query = NearbyQuery {
            latitude,
            longitude,
            within,
            bounds,
        };
        blocking(ctx, move |db| users::get_nearby(db, &query, requester)).await
    }
}

#[derive(Default)]
pub struct RideQuery;

#[Object]
impl RideQuery {
    async fn ride(&self, ctx: &Context<'_>, id: i64) -> async_graphql::Result<Option<Ride>> {
        let session = session(ctx);
        let ride = blocking(ctx, move |db| rides::get(db, id)).await?;
        Ok(ride.filter(|ride| rides::visible_to(ride, &session)))
    }

    async fn rides(&self, ctx: &Context<'_>) -> async_graphql::Result<Vec<Ride>> {
        let session = session(ctx);
        blocking(ctx, move |db| rides::list(db, &session)).await
    }
}

// -- Mutations --

#[derive(Default)]
pub struct ImageMutation;

#[Object]
impl ImageMutation {
    async fn create_image_signature(&self, ctx: &Context<'_>) -> async_graphql::Result<ImageSignature> {
        gql(session(ctx).require())?;
        let signer = ctx.data::<ImageSigner>()?;
        gql(signer.sign_now())
    }
}

#[derive(Default)]
pub struct UserMutation;

#[Object]
impl UserMutation {
    /// Replaces every user with the mock user. Admins only.
    async fn seed(&self, ctx: &Context<'_>) -> async_graphql::Result<DeleteResult> {
        gql(session(ctx).require_role(Role::Admin))?;
        blocking(ctx, |db| Ok(users::seed(db))).await
    }

    async fn user_add(&self, ctx: &Context<'_>, input: UserAddInput) -> async_graphql::Result<User> {
        gql(session(ctx).require())?;
        blocking(ctx, move |db| users::add(db, input)).await
    }

    async fn user_update(
        &self,
        ctx: &Context<'_>,
        id: i64,
        input: UserUpdateInput,
    ) -> async_graphql::Result<Option<User>> {
        gql(session(ctx).require_owner(id))?;
        blocking(ctx, move |db| users::update(db, id, input)).await
    }

    async fn user_delete(&self, ctx: &Context<'_>, id: i64) -> async_graphql::Result<DeleteResult> {
        gql(session(ctx).require_owner(id))?;
        blocking(ctx, move |db| users::delete(db, id)).await
    }
}

#[derive(Default)]
pub struct RideMutation;

#[Object]
impl RideMutation {
    async fn ride_add(&self, ctx: &Context<'_>, input: RideAddInput) -> async_graphql::Result<Ride> {
        gql(session(ctx).require())?;
        blocking(ctx, move |db| rides::add(db, &input)).await
    }
}

#[cfg(test)]
mod tests {
    use async_graphql::Request;
    use boatdaddy_db::seed::MOCK_USER_ID;
    use boatdaddy_types::models::Provider;
    use serde_json::{Value, json};

    use super::*;

    struct Harness {
        db: Arc<Database>,
        schema: BoatSchema,
    }

    impl Harness {
        fn new() -> Self {
            let db = Arc::new(Database::open_in_memory().unwrap());
            let schema = build_schema(db.clone(), ImageSigner::new(Some("abcd".into())));
            Self { db, schema }
        }

        async fn run(&self, query: &str, session: RequestSession) -> Value {
            let response = self.schema.execute(Request::new(query).data(session)).await;
            serde_json::to_value(&response).unwrap()
        }

        fn user(&self, username: &str, roles: &[&str]) -> i64 {
            self.db
                .create_user(&boatdaddy_db::models::NewUser {
                    username: username.to_string(),
                    email: format!("{}@boatdaddy.app", username),
                    roles: roles.iter().map(|r| r.to_string()).collect(),
                    ..Default::default()
                })
                .unwrap()
        }
    }

    fn signed_in(user_id: i64, roles: Vec<Role>) -> RequestSession {
        RequestSession(Some(Session {
            provider: Provider::Test,
            user_id,
            username: format!("user{}", user_id),
            roles,
        }))
    }

    fn error_code(body: &Value) -> &str {
        body["errors"][0]["extensions"]["code"].as_str().unwrap_or_default()
    }

    #[tokio::test]
    async fn about_and_anonymous_auth() {
        let h = Harness::new();
        let body = h.run("{ about auth { userId } }", RequestSession::anonymous()).await;
        assert_eq!(body["data"]["about"], ABOUT);
        assert_eq!(body["data"]["auth"], Value::Null);

        let body = h.run("{ auth { userId roles provider } }", signed_in(4, vec![Role::Driver])).await;
        assert_eq!(body["data"]["auth"], json!({ "userId": 4, "roles": ["DRIVER"], "provider": "TEST" }));
    }

    #[tokio::test]
    async fn anonymous_mutations_are_unauthenticated() {
        let h = Harness::new();
        let mutations = [
            "mutation { createImageSignature { signature } }",
            "mutation { seed { success } }",
            r#"mutation { userAdd(input: { email: "a@b.co", username: "abc", name: "A" }) { id } }"#,
            "mutation { userUpdate(id: 1, input: { bio: \"hi\" }) { id } }",
            "mutation { userDelete(id: 1) { success } }",
            "mutation { rideAdd(input: { driverId: 1, riderId: 2 }) { id } }",
        ];
        for mutation in mutations {
            let body = h.run(mutation, RequestSession::anonymous()).await;
            assert_eq!(error_code(&body), "UNAUTHENTICATED", "{}", mutation);
            assert_eq!(body["errors"][0]["message"], "Must be signed in");
        }
    }

    #[tokio::test]
    async fn user_add_then_lookup() {
        let h = Harness::new();
        let caller = signed_in(99, vec![Role::Rider]);

        let body = h
            .run(
                r#"mutation { userAdd(input: { email: "skip@boatdaddy.app", username: "skipper", name: "Skip" }) {
                    id username roles profile { name isBoatDaddy }
                } }"#,
                caller.clone(),
            )
            .await;
        let added = &body["data"]["userAdd"];
        assert_eq!(added["roles"], json!(["RIDER"]));
        assert_eq!(added["profile"], json!({ "name": "Skip", "isBoatDaddy": false }));

        let body = h
            .run(r#"{ user(email: "skip@boatdaddy.app") { username } profile(username: "skipper") { name } }"#, caller.clone())
            .await;
        assert_eq!(body["data"]["user"]["username"], "skipper");
        assert_eq!(body["data"]["profile"]["name"], "Skip");

        let body = h.run(r#"{ user(username: "nobody") { id } }"#, caller.clone()).await;
        assert_eq!(body["data"]["user"], Value::Null);

        let body = h.run("{ user { id } }", caller).await;
        assert_eq!(error_code(&body), "BAD_USER_INPUT");
    }

    #[tokio::test]
    async fn invalid_username_is_bad_input() {
        let h = Harness::new();
        let body = h
            .run(
                r#"mutation { userAdd(input: { email: "a@b.co", username: "ab", name: "A" }) { id } }"#,
                signed_in(1, vec![Role::Rider]),
            )
            .await;
        assert_eq!(error_code(&body), "BAD_USER_INPUT");
        assert_eq!(body["errors"][0]["message"], "Username must be at least three characters long");
    }

    #[tokio::test]
    async fn user_list_filters_on_flag() {
        let h = Harness::new();
        let a = h.user("alpha", &["DRIVER"]);
        h.user("bravo", &["DRIVER"]);
        let admin = signed_in(a, vec![Role::Driver]);
        h.run(&format!("mutation {{ userUpdate(id: {}, input: {{ isBoatDaddy: true }}) {{ id }} }}", a), admin.clone())
            .await;

        let body = h
            .run("{ userList(isBoatDaddy: true, role: DRIVER) { pages users { username } } }", admin.clone())
            .await;
        assert_eq!(body["data"]["userList"], json!({ "pages": 1, "users": [{ "username": "alpha" }] }));

        let body = h.run("{ users { users { username } } }", admin).await;
        assert_eq!(body["data"]["users"]["users"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn nearby_drivers_excludes_requester() {
        let h = Harness::new();
        let me = h.user("myself", &["DRIVER"]);
        let other = h.user("other", &["DRIVER"]);
        for (id, lat, lng) in [(me, 40.5, -74.5), (other, 40.6, -74.2)] {
            let changes = boatdaddy_db::models::UserChanges {
                latitude: Some(lat),
                longitude: Some(lng),
                is_boat_daddy: Some(true),
                ..Default::default()
            };
            h.db.update_user(id, &changes).unwrap();
        }

        let query = r#"{ nearbyDrivers(latitude: 40.5, longitude: -74.5, within: 5, bounds: "[[-75,40],[-74,41]]") { username } }"#;
        let body = h.run(query, signed_in(me, vec![Role::Driver])).await;
        assert_eq!(body["data"]["nearbyDrivers"], json!([{ "username": "other" }]));

        let body = h
            .run(r#"{ nearbyDrivers(latitude: 0, longitude: 0, bounds: "[[1,2]") { id } }"#, RequestSession::anonymous())
            .await;
        assert_eq!(error_code(&body), "BAD_USER_INPUT");
    }

    #[tokio::test]
    async fn ride_add_and_scoped_reads() {
        let h = Harness::new();
        let captain = h.user("captain", &["DRIVER"]);
        let guest = h.user("guest", &["RIDER"]);
        let stranger = h.user("stranger", &["RIDER"]);
        let caller = signed_in(guest, vec![Role::Rider]);

        let body = h
            .run(
                &format!(
                    "mutation {{ rideAdd(input: {{ driverId: {}, riderId: {} }}) {{ id driver {{ role user {{ username }} }} rider {{ user {{ username }} }} }} }}",
                    captain, guest
                ),
                caller.clone(),
            )
            .await;
        let ride = &body["data"]["rideAdd"];
        assert_eq!(ride["driver"]["role"], "DRIVER");
        assert_eq!(ride["driver"]["user"]["username"], "captain");
        assert_eq!(ride["rider"]["user"]["username"], "guest");
        let ride_id = ride["id"].as_i64().unwrap();

        let query = format!("{{ ride(id: {}) {{ id }} rides {{ id }} }}", ride_id);
        let body = h.run(&query, caller).await;
        assert_eq!(body["data"]["ride"]["id"], ride_id);
        assert_eq!(body["data"]["rides"].as_array().unwrap().len(), 1);

        let body = h.run(&query, signed_in(stranger, vec![Role::Rider])).await;
        assert_eq!(body["data"]["ride"], Value::Null);
        assert_eq!(body["data"]["rides"], json!([]));

        let body = h
            .run(
                &format!("mutation {{ rideAdd(input: {{ driverId: {}, riderId: {} }}) {{ id }} }}", guest, captain),
                signed_in(guest, vec![Role::Rider]),
            )
            .await;
        assert_eq!(error_code(&body), "BAD_USER_INPUT");
    }

    #[tokio::test]
    async fn only_owner_or_admin_may_edit() {
        let h = Harness::new();
        let owner = h.user("owner", &["RIDER"]);
        let intruder = h.user("intruder", &["RIDER"]);

        let update = format!("mutation {{ userUpdate(id: {}, input: {{ bio: \"mine\" }}) {{ profile {{ bio }} }} }}", owner);
        let body = h.run(&update, signed_in(intruder, vec![Role::Rider])).await;
        assert_eq!(error_code(&body), "FORBIDDEN");

        let body = h.run(&update, signed_in(owner, vec![Role::Rider])).await;
        assert_eq!(body["data"]["userUpdate"]["profile"]["bio"], "mine");

        let delete = format!("mutation {{ userDelete(id: {}) {{ success numberDeleted }} }}", owner);
        let body = h.run(&delete, signed_in(intruder, vec![Role::Rider])).await;
        assert_eq!(error_code(&body), "FORBIDDEN");

        let body = h.run(&delete, signed_in(intruder, vec![Role::Admin])).await;
        assert_eq!(body["data"]["userDelete"], json!({ "success": true, "numberDeleted": 1 }));
    }

    #[tokio::test]
    async fn seed_requires_admin_and_is_repeatable() {
        let h = Harness::new();
        h.user("stowaway", &["RIDER"]);

        let body = h.run("mutation { seed { success } }", signed_in(2, vec![Role::Rider])).await;
        assert_eq!(error_code(&body), "FORBIDDEN");

        let admin = signed_in(MOCK_USER_ID, vec![Role::Admin]);
        for _ in 0..2 {
            let body = h.run("mutation { seed { success numberDeleted } }", admin.clone()).await;
            assert_eq!(body["data"]["seed"], json!({ "success": true, "numberDeleted": 1 }));
        }

        let body = h.run("{ users { users { id email roles } } }", admin).await;
        assert_eq!(
            body["data"]["users"]["users"],
            json!([{ "id": MOCK_USER_ID, "email": "john_daddy@boatdaddy.app", "roles": ["RIDER", "DRIVER", "ADMIN"] }])
        );
    }

    #[tokio::test]
    async fn image_signature_for_signed_in_callers() {
        let h = Harness::new();
        let body = h
            .run("mutation { createImageSignature { signature timestamp } }", signed_in(1, vec![Role::Rider]))
            .await;
        let signed = &body["data"]["createImageSignature"];
        assert_eq!(signed["signature"].as_str().unwrap().len(), 40);
        assert!(signed["timestamp"].as_i64().unwrap() > 0);
    }
}
