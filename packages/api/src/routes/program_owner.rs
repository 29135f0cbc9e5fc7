use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use store::models::{ProgramOwner, ProgramOwnerInput};
use store::{Action, Resource};
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::error::ApiResult;
use crate::routes::{ApiJson, ApiPath};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/program-owner", get(show).post(create))
        .route("/program-owner/{id}", put(update))
}

/// The configured church, or `null` before one is set up.
async fn show(
    user: CurrentUser,
    State(state): State<AppState>,
) -> ApiResult<Json<Option<ProgramOwner>>> {
    user.require(Resource::ProgramOwner, Action::View)?;
    Ok(Json(state.store.get_program_owner().await?))
}

async fn create(
    user: CurrentUser,
    State(state): State<AppState>,
    ApiJson(input): ApiJson<ProgramOwnerInput>,
) -> ApiResult<(StatusCode, Json<ProgramOwner>)> {
    user.require(Resource::ProgramOwner, Action::Add)?;
    let owner = state.store.create_program_owner(input).await?;
    tracing::info!("Program owner set to {}", owner.church_name);
    Ok((StatusCode::CREATED, Json(owner)))
}

async fn update(
    user: CurrentUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(input): ApiJson<ProgramOwnerInput>,
) -> ApiResult<Json<ProgramOwner>> {
    user.require(Resource::ProgramOwner, Action::Edit)?;
    Ok(Json(state.store.update_program_owner(id, input).await?))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::{json, Value};
    use store::{PermissionFlags, Resource, ResourcePermissions};

    use crate::routes::test_support::TestApp;

    #[tokio::test]
    async fn test_program_owner_is_created_once() {
        let app = TestApp::new();
        let token = app.admin_token().await;

        let (status, body) = app.get("/program-owner", &token).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Value::Null);

        let (status, owner) = app
            .post("/program-owner", &token, json!({ "churchName": "Grace Chapel" }))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(owner["churchName"], "Grace Chapel");

        let (status, _) = app
            .post("/program-owner", &token, json!({ "churchName": "Second Church" }))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let id = owner["id"].as_str().unwrap();
        let (status, updated) = app
            .put(
                &format!("/program-owner/{id}"),
                &token,
                json!({ "churchName": "Grace Chapel", "pastorName": "R. Boaz" }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["pastorName"], "R. Boaz");
    }

    #[tokio::test]
    async fn test_read_only_user_cannot_create() {
        let app = TestApp::new();
        let flags =
            PermissionFlags::none().with(Resource::ProgramOwner, ResourcePermissions::READ_ONLY);
        let token = app.token_with("clerk", flags).await;

        let (status, _) = app.get("/program-owner", &token).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = app
            .post("/program-owner", &token, json!({ "churchName": "Grace Chapel" }))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(body["error"].as_str().unwrap().contains("permission"));
    }
}
