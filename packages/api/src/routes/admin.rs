//! # User and user-level administration
//!
//! Users carry their own copy of the permission flags. A user level is a named
//! preset: when a user is created or moved to a level without explicit
//! `permissions` in the request, the level's flags are copied onto the user.
//! Later edits to the level do not touch users that were created from it.
//!
//! An administrator cannot lock themselves out: deleting, deactivating or
//! removing `userAccess` from one's own account is refused. Nobody can hand out
//! flags allowing more than their own do. Deactivating a user or changing
//! their password ends all of their sessions.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use store::models::{NewUser, User, UserLevel, UserLevelInput, UserUpdate};
use store::{Action, PermissionFlags, Resource};
use uuid::Uuid;

use crate::auth::{check_password_rules, hash_password, CurrentUser};
use crate::error::{ApiError, ApiResult, Message};
use crate::routes::{ApiJson, ApiPath};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/admin/users", get(list_users).post(create_user))
        .route(
            "/admin/users/{id}",
            get(show_user).put(update_user).delete(remove_user),
        )
        .route("/admin/user-levels", get(list_levels).post(create_level))
        .route(
            "/admin/user-levels/{id}",
            get(show_level).put(update_level).delete(remove_level),
        )
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub member_id: Option<Uuid>,
    #[serde(default)]
    pub level_id: Option<Uuid>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub permissions: Option<PermissionFlags>,
}

/// Full replacement of a user. `password` is optional; omitted keeps the
/// current one.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub member_id: Option<Uuid>,
    #[serde(default)]
    pub level_id: Option<Uuid>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub permissions: Option<PermissionFlags>,
}

/// Flags for a user: explicit flags win, then the level preset, then `fallback`.
async fn resolve_permissions(
    state: &AppState,
    explicit: Option<PermissionFlags>,
    level_id: Option<Uuid>,
    fallback: PermissionFlags,
) -> ApiResult<PermissionFlags> {
    if let Some(flags) = explicit {
        return Ok(flags);
    }
    match level_id {
        Some(id) => Ok(state.store.get_user_level(id).await?.permissions),
        None => Ok(fallback),
    }
}

/// Refuse to grant anything the acting user could not do themselves.
fn check_grantable(current: &CurrentUser, permissions: &PermissionFlags) -> ApiResult<()> {
    if permissions.within(&current.user.permissions) {
        return Ok(());
    }
    tracing::warn!(
        "User {} tried to grant permissions they do not hold",
        current.user.username
    );
    Err(ApiError::Forbidden("You cannot grant permissions you do not hold".into()))
}

async fn list_users(
    user: CurrentUser,
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<User>>> {
    user.require(Resource::User, Action::View)?;
    Ok(Json(state.store.list_users().await?))
}

async fn show_user(
    user: CurrentUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<User>> {
    user.require(Resource::User, Action::View)?;
    Ok(Json(state.store.get_user(id).await?))
}

async fn create_user(
    current: CurrentUser,
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<User>)> {
    current.require(Resource::User, Action::Add)?;
    check_password_rules(&req.password)?;

    let permissions =
        resolve_permissions(&state, req.permissions, req.level_id, PermissionFlags::none()).await?;
    check_grantable(&current, &permissions)?;
    let password_hash = hash_password(&req.password)?;
    let user = state
        .store
        .create_user(NewUser {
            username: req.username.trim().to_string(),
            password_hash,
            full_name: req.full_name,
            email: req.email,
            member_id: req.member_id,
            level_id: req.level_id,
            is_active: req.is_active,
            permissions,
        })
        .await?;
    tracing::info!("{} created user {}", current.user.username, user.username);
    Ok((StatusCode::CREATED, Json(user)))
}

async fn update_user(
    current: CurrentUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<UpdateUserRequest>,
) -> ApiResult<Json<User>> {
    current.require(Resource::User, Action::Edit)?;
    let existing = state.store.get_user(id).await?;

    // A level change without explicit flags applies the new level's preset;
    // otherwise the user keeps the flags they have.
    let level_changed = req.level_id.is_some() && req.level_id != existing.level_id;
    let permissions = resolve_permissions(
        &state,
        req.permissions,
        req.level_id.filter(|_| level_changed),
        existing.permissions.clone(),
    )
    .await?;
    if permissions != existing.permissions {
        check_grantable(&current, &permissions)?;
    }

    if id == current.user.id {
        if !req.is_active {
            return Err(ApiError::bad_request("You cannot deactivate your own account"));
        }
        if !permissions.has_access(Resource::User) {
            return Err(ApiError::bad_request("You cannot remove your own user access"));
        }
    }

    let password_hash = match req.password.as_deref() {
        Some(password) => {
            check_password_rules(password)?;
            Some(hash_password(password)?)
        }
        None => None,
    };
    let password_changed = password_hash.is_some();

    let user = state
        .store
        .update_user(
            id,
            UserUpdate {
                username: req.username.trim().to_string(),
                password_hash,
                full_name: req.full_name,
                email: req.email,
                member_id: req.member_id,
                level_id: req.level_id,
                is_active: req.is_active,
                permissions,
            },
        )
        .await?;

    if !user.is_active || password_changed {
        state.store.delete_user_sessions(user.id).await?;
        tracing::info!("Ended sessions of user {}", user.username);
    }
    Ok(Json(user))
}

async fn remove_user(
    current: CurrentUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Message>> {
    current.require(Resource::User, Action::Delete)?;
    if id == current.user.id {
        return Err(ApiError::bad_request("You cannot delete your own account"));
    }
    state.store.delete_user(id).await?;
    tracing::info!("{} deleted user {}", current.user.username, id);
    Ok(Message::new("User deleted"))
}

async fn list_levels(
    user: CurrentUser,
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<UserLevel>>> {
    user.require(Resource::UserLevel, Action::View)?;
    Ok(Json(state.store.list_user_levels().await?))
}

async fn show_level(
    user: CurrentUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<UserLevel>> {
    user.require(Resource::UserLevel, Action::View)?;
    Ok(Json(state.store.get_user_level(id).await?))
}

async fn create_level(
    user: CurrentUser,
    State(state): State<AppState>,
    ApiJson(input): ApiJson<UserLevelInput>,
) -> ApiResult<(StatusCode, Json<UserLevel>)> {
    user.require(Resource::UserLevel, Action::Add)?;
    let level = state.store.create_user_level(input).await?;
    Ok((StatusCode::CREATED, Json(level)))
}

async fn update_level(
    user: CurrentUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(input): ApiJson<UserLevelInput>,
) -> ApiResult<Json<UserLevel>> {
    user.require(Resource::UserLevel, Action::Edit)?;
    Ok(Json(state.store.update_user_level(id, input).await?))
}

async fn remove_level(
    user: CurrentUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Message>> {
    user.require(Resource::UserLevel, Action::Delete)?;
    state.store.delete_user_level(id).await?;
    Ok(Message::new("User level deleted"))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::{json, Value};
    use store::{PermissionFlags, Resource, ResourcePermissions};

    use crate::routes::test_support::TestApp;

    async fn me(app: &TestApp, token: &str) -> Value {
        let (status, me) = app.get("/auth/me", token).await;
        assert_eq!(status, StatusCode::OK);
        me
    }

    #[tokio::test]
    async fn test_user_created_from_level_copies_flags() {
        let app = TestApp::new();
        let token = app.admin_token().await;

        let (status, level) = app
            .post(
                "/admin/user-levels",
                &token,
                json!({
                    "name": "Usher",
                    "permissions": {
                        "memberAccess": true,
                        "visitorAccess": true,
                        "canAddVisitor": true
                    }
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let level_id = level["id"].as_str().unwrap();

        let (status, user) = app
            .post(
                "/admin/users",
                &token,
                json!({ "username": "usher1", "password": "welcome-in", "levelId": level_id }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(user["permissions"]["canAddVisitor"], true);
        assert_eq!(user["permissions"]["donationAccess"], false);
        assert_eq!(user["isActive"], true);
        assert!(user.get("passwordHash").is_none());

        let (status, explicit) = app
            .post(
                "/admin/users",
                &token,
                json!({
                    "username": "usher2",
                    "password": "welcome-in",
                    "levelId": level_id,
                    "permissions": { "reportAccess": true }
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(explicit["permissions"]["reportAccess"], true);
        assert_eq!(explicit["permissions"]["memberAccess"], false);

        let (status, _) = app
            .post(
                "/admin/users",
                &token,
                json!({ "username": "USHER1", "password": "welcome-in" }),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, users) = app.get("/admin/users", &token).await;
        assert_eq!(users.as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_admin_cannot_lock_themselves_out() {
        let app = TestApp::new();
        let token = app.admin_token().await;
        let id = me(&app, &token).await["id"].as_str().unwrap().to_string();

        let (status, _) = app.delete(&format!("/admin/users/{id}"), &token).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app
            .put(
                &format!("/admin/users/{id}"),
                &token,
                json!({ "username": "admin", "isActive": false }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let mut flags = serde_json::to_value(PermissionFlags::all()).unwrap();
        flags["userAccess"] = json!(false);
        let (status, body) = app
            .put(
                &format!("/admin/users/{id}"),
                &token,
                json!({ "username": "admin", "permissions": flags }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("user access"));

        let (status, renamed) = app
            .put(
                &format!("/admin/users/{id}"),
                &token,
                json!({ "username": "pastor", "fullName": "Pastor John" }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(renamed["username"], "pastor");
        assert_eq!(renamed["permissions"]["userAccess"], true);
    }

    #[tokio::test]
    async fn test_cannot_grant_flags_beyond_own() {
        let app = TestApp::new();
        let admin = app.admin_token().await;
        let clerk_flags = PermissionFlags::none()
            .with(Resource::User, ResourcePermissions::FULL)
            .with(Resource::Member, ResourcePermissions::READ_ONLY);
        let clerk = app.token_with("clerk", clerk_flags).await;

        let (status, body) = app
            .post(
                "/admin/users",
                &clerk,
                json!({
                    "username": "helper",
                    "password": "welcome-in",
                    "permissions": { "donationAccess": true }
                }),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(body["error"].as_str().unwrap().contains("do not hold"));

        let (status, _) = app
            .post(
                "/admin/users",
                &clerk,
                json!({
                    "username": "helper",
                    "password": "welcome-in",
                    "permissions": { "memberAccess": true, "cannotDeleteMember": true }
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        // Editing a more privileged user is fine while their flags stay put
        let admin_id = me(&app, &admin).await["id"].as_str().unwrap().to_string();
        let (status, _) = app
            .put(
                &format!("/admin/users/{admin_id}"),
                &clerk,
                json!({ "username": "admin", "fullName": "Office Admin" }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = app
            .put(
                &format!("/admin/users/{admin_id}"),
                &clerk,
                json!({ "username": "admin", "permissions": { "userAccess": true } }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = app
            .put(
                &format!("/admin/users/{admin_id}"),
                &clerk,
                json!({ "username": "admin", "permissions": PermissionFlags::all() }),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_deactivating_a_user_ends_their_sessions() {
        let app = TestApp::new();
        let admin = app.admin_token().await;
        let clerk = app
            .token_with(
                "clerk",
                PermissionFlags::none().with(Resource::Member, ResourcePermissions::READ_ONLY),
            )
            .await;
        let clerk_id = me(&app, &clerk).await["id"].as_str().unwrap().to_string();

        let (status, _) = app.get("/admin/users", &clerk).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, user) = app
            .put(
                &format!("/admin/users/{clerk_id}"),
                &admin,
                json!({ "username": "clerk", "isActive": false }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(user["isActive"], false);
        assert_eq!(user["permissions"]["memberAccess"], true);

        let (status, _) = app.get("/members", &clerk).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = app.delete(&format!("/admin/users/{clerk_id}"), &admin).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app.get(&format!("/admin/users/{clerk_id}"), &admin).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_user_levels_crud() {
        let app = TestApp::new();
        let token = app.admin_token().await;
        let (_, level) = app
            .post("/admin/user-levels", &token, json!({ "name": "Treasurer" }))
            .await;
        let id = level["id"].as_str().unwrap();

        let (status, _) = app
            .post("/admin/user-levels", &token, json!({ "name": "treasurer" }))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, updated) = app
            .put(
                &format!("/admin/user-levels/{id}"),
                &token,
                json!({ "name": "Treasurer", "permissions": { "donationAccess": true } }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["permissions"]["donationAccess"], true);

        let (status, _) = app.delete(&format!("/admin/user-levels/{id}"), &token).await;
        assert_eq!(status, StatusCode::OK);
        let (_, levels) = app.get("/admin/user-levels", &token).await;
        assert!(levels.as_array().unwrap().is_empty());
    }
}
