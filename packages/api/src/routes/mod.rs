//! # HTTP routes
//!
//! One module per resource. Every handler except `/health`, `/auth/login` and
//! `/auth/register` takes a [`CurrentUser`](crate::auth::CurrentUser) and checks
//! the matching permission flag before touching the store.
//!
//! | Module | Paths |
//! |--------|-------|
//! | [`auth`] | `/auth/register`, `/auth/login`, `/auth/logout`, `/auth/me`, `/auth/password` |
//! | [`program_owner`] | `/program-owner` |
//! | [`members`] | `/members` |
//! | [`visitors`] | `/visitors` |
//! | [`donations`] | `/donations` |
//! | [`groups`] | `/groups`, `/groups/{id}/members` |
//! | [`expenses`] | `/expense-categories`, `/expenses` |
//! | [`reports`] | `/reports/donations` |
//! | [`admin`] | `/admin/users`, `/admin/user-levels` |

use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub mod admin;
pub mod auth;
pub mod donations;
pub mod expenses;
mod extract;
pub mod groups;
pub mod members;
pub mod program_owner;
pub mod reports;
pub mod visitors;

pub use extract::{ApiJson, ApiPath, ApiQuery};

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(auth::routes())
        .merge(program_owner::routes())
        .merge(members::routes())
        .merge(visitors::routes())
        .merge(donations::routes())
        .merge(groups::routes())
        .merge(expenses::routes())
        .merge(reports::routes())
        .merge(admin::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
    use axum::http::{Method, Request, StatusCode};
    use axum::Router;
    use serde_json::Value;
    use store::models::NewUser;
    use store::{MemoryStore, PermissionFlags};
    use tower::ServiceExt;

    use crate::auth::issue_session;
    use crate::state::AppState;

    pub struct TestApp {
        pub router: Router,
        pub state: AppState,
    }

    impl TestApp {
        pub fn new() -> Self {
            let state = AppState::new(Arc::new(MemoryStore::new()), chrono::Duration::hours(1));
            TestApp {
                router: super::router(state.clone()),
                state,
            }
        }

        /// Create a user with the given flags and return a bearer token for it.
        /// The stored hash is a placeholder; use `/auth/register` when a test
        /// needs to log in with a password.
        pub async fn token_with(&self, username: &str, permissions: PermissionFlags) -> String {
            let user = self
                .state
                .store
                .create_user(NewUser {
                    username: username.into(),
                    password_hash: "unused".into(),
                    full_name: None,
                    email: None,
                    member_id: None,
                    level_id: None,
                    is_active: true,
                    permissions,
                })
                .await
                .unwrap();
            issue_session(&self.state, &user).await.unwrap().token
        }

        pub async fn admin_token(&self) -> String {
            self.token_with("admin", PermissionFlags::all()).await
        }

        pub async fn send(
            &self,
            method: Method,
            uri: &str,
            token: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut request = Request::builder().method(method).uri(uri);
            if let Some(token) = token {
                request = request.header(AUTHORIZATION, format!("Bearer {token}"));
            }
            let request = match body {
                Some(body) => request
                    .header(CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string())),
                None => request.body(Body::empty()),
            }
            .unwrap();

            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
            (status, value)
        }

        pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
            self.send(Method::GET, uri, Some(token), None).await
        }

        pub async fn post(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
            self.send(Method::POST, uri, Some(token), Some(body)).await
        }

        pub async fn put(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
            self.send(Method::PUT, uri, Some(token), Some(body)).await
        }

        pub async fn delete(&self, uri: &str, token: &str) -> (StatusCode, Value) {
            self.send(Method::DELETE, uri, Some(token), None).await
        }
    }
}
