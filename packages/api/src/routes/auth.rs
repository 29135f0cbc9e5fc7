//! Registration, login and the session endpoints.
//!
//! `POST /auth/register` only works on an empty installation: it creates the
//! first account with every permission flag set. After that, accounts are
//! managed through `/admin/users`.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use store::models::{NewUser, User, UserUpdate};
use store::PermissionFlags;

use crate::auth::{check_password_rules, hash_password, issue_session, verify_password, CurrentUser};
use crate::error::{ApiError, ApiResult, Message};
use crate::routes::ApiJson;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
        .route("/auth/password", put(change_password))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: User,
}

async fn login_response(state: &AppState, user: User) -> ApiResult<LoginResponse> {
    let session = issue_session(state, &user).await?;
    Ok(LoginResponse {
        token: session.token,
        expires_at: session.expires_at,
        user,
    })
}

async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<LoginResponse>)> {
    if state.store.count_users().await? > 0 {
        return Err(ApiError::Conflict(
            "Registration is closed; ask an administrator for an account".into(),
        ));
    }

    let username = req.username.trim().to_string();
    if username.is_empty() {
        return Err(ApiError::bad_request("Username is required"));
    }
    check_password_rules(&req.password)?;
    let password_hash = hash_password(&req.password)?;

    let user = state
        .store
        .create_user(NewUser {
            username,
            password_hash,
            full_name: req.full_name,
            email: req.email,
            member_id: None,
            level_id: None,
            is_active: true,
            permissions: PermissionFlags::all(),
        })
        .await?;
    tracing::info!("Registered first user {}", user.username);

    let response = login_response(&state, user).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let invalid = || ApiError::unauthorized("Invalid username or password");

    let user = state
        .store
        .find_user_by_username(req.username.trim())
        .await?
        .ok_or_else(invalid)?;

    if !verify_password(&req.password, &user.password_hash)? {
        tracing::warn!("Failed login for {}", user.username);
        return Err(invalid());
    }
    if !user.is_active {
        return Err(ApiError::unauthorized("Account is disabled"));
    }

    Ok(Json(login_response(&state, user).await?))
}

async fn logout(user: CurrentUser, State(state): State<AppState>) -> ApiResult<Json<Message>> {
    state.store.delete_session(&user.token).await?;
    Ok(Message::new("Logged out"))
}

async fn me(user: CurrentUser) -> Json<User> {
    Json(user.user)
}

/// Change the caller's own password. Every session of the user is dropped and
/// a fresh token is returned.
async fn change_password(
    current: CurrentUser,
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ChangePasswordRequest>,
) -> ApiResult<Json<LoginResponse>> {
    if !verify_password(&req.current_password, &current.user.password_hash)? {
        return Err(ApiError::bad_request("Current password is incorrect"));
    }
    check_password_rules(&req.new_password)?;
    let password_hash = hash_password(&req.new_password)?;

    let user = current.user;
    let user = state
        .store
        .update_user(
            user.id,
            UserUpdate {
                username: user.username,
                password_hash: Some(password_hash),
                full_name: user.full_name,
                email: user.email,
                member_id: user.member_id,
                level_id: user.level_id,
                is_active: user.is_active,
                permissions: user.permissions,
            },
        )
        .await?;
    state.store.delete_user_sessions(user.id).await?;

    Ok(Json(login_response(&state, user).await?))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use chrono::Utc;
    use serde_json::json;
    use store::models::Session;

    use crate::routes::test_support::TestApp;

    async fn register(app: &TestApp) -> String {
        let (status, body) = app
            .send(
                Method::POST,
                "/auth/register",
                None,
                Some(json!({ "username": "pastor", "password": "shepherd1" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        body["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_register_first_user_gets_all_flags() {
        let app = TestApp::new();
        let token = register(&app).await;

        let (status, me) = app.get("/auth/me", &token).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["username"], "pastor");
        assert_eq!(me["permissions"]["memberAccess"], true);
        assert_eq!(me["permissions"]["cannotDeleteMember"], false);
        assert!(me.get("passwordHash").is_none());

        let (status, _) = app
            .send(
                Method::POST,
                "/auth/register",
                None,
                Some(json!({ "username": "second", "password": "shepherd2" })),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_register_rejects_short_password() {
        let app = TestApp::new();
        let (status, body) = app
            .send(
                Method::POST,
                "/auth/register",
                None,
                Some(json!({ "username": "pastor", "password": "short" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("at least 8"));
    }

    #[tokio::test]
    async fn test_login_and_logout() {
        let app = TestApp::new();
        register(&app).await;

        let (status, _) = app
            .send(
                Method::POST,
                "/auth/login",
                None,
                Some(json!({ "username": "pastor", "password": "wrong-password" })),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = app
            .send(
                Method::POST,
                "/auth/login",
                None,
                Some(json!({ "username": "PASTOR", "password": "shepherd1" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let token = body["token"].as_str().unwrap().to_string();
        assert!(body["expiresAt"].is_string());

        let (status, _) = app.send(Method::POST, "/auth/logout", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = app.get("/auth/me", &token).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid or expired token");
    }

    #[tokio::test]
    async fn test_me_requires_token() {
        let app = TestApp::new();
        let (status, body) = app.send(Method::GET, "/auth/me", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Not authenticated");
    }

    #[tokio::test]
    async fn test_change_password_rotates_sessions() {
        let app = TestApp::new();
        let old_token = register(&app).await;

        let (status, _) = app
            .put(
                "/auth/password",
                &old_token,
                json!({ "currentPassword": "nope-nope", "newPassword": "shepherd2" }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = app
            .put(
                "/auth/password",
                &old_token,
                json!({ "currentPassword": "shepherd1", "newPassword": "shepherd2" }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let new_token = body["token"].as_str().unwrap();

        let (status, _) = app.get("/auth/me", &old_token).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = app.get("/auth/me", new_token).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = app
            .send(
                Method::POST,
                "/auth/login",
                None,
                Some(json!({ "username": "pastor", "password": "shepherd2" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_login_sweeps_expired_sessions() {
        let app = TestApp::new();
        let token = register(&app).await;
        let (_, me) = app.get("/auth/me", &token).await;
        let user_id = me["id"].as_str().unwrap().parse().unwrap();

        let stale = Session {
            token: "stale-token".into(),
            user_id,
            expires_at: Utc::now() - chrono::Duration::minutes(5),
        };
        app.state.store.create_session(stale).await.unwrap();

        let (status, _) = app
            .send(
                Method::POST,
                "/auth/login",
                None,
                Some(json!({ "username": "pastor", "password": "shepherd1" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let found = app.state.store.find_session("stale-token").await.unwrap();
        assert!(found.is_none());
        assert!(app.state.store.find_session(&token).await.unwrap().is_some());
    }
}
