use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use store::models::{Visitor, VisitorInput};
use store::{Action, Resource};
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::error::{ApiResult, Message};
use crate::routes::members::SearchQuery;
use crate::routes::{ApiJson, ApiPath, ApiQuery};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/visitors", get(list).post(create))
        .route("/visitors/{id}", get(show).put(update).delete(remove))
}

async fn list(
    user: CurrentUser,
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<SearchQuery>,
) -> ApiResult<Json<Vec<Visitor>>> {
    user.require(Resource::Visitor, Action::View)?;
    Ok(Json(state.store.list_visitors(query.search.as_deref()).await?))
}

async fn show(
    user: CurrentUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Visitor>> {
    user.require(Resource::Visitor, Action::View)?;
    Ok(Json(state.store.get_visitor(id).await?))
}

async fn create(
    user: CurrentUser,
    State(state): State<AppState>,
    ApiJson(input): ApiJson<VisitorInput>,
) -> ApiResult<(StatusCode, Json<Visitor>)> {
    user.require(Resource::Visitor, Action::Add)?;
    let visitor = state.store.create_visitor(input).await?;
    tracing::info!("Created visitor {}", visitor.visitor_number);
    Ok((StatusCode::CREATED, Json(visitor)))
}

async fn update(
    user: CurrentUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(input): ApiJson<VisitorInput>,
) -> ApiResult<Json<Visitor>> {
    user.require(Resource::Visitor, Action::Edit)?;
    Ok(Json(state.store.update_visitor(id, input).await?))
}

async fn remove(
    user: CurrentUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Message>> {
    user.require(Resource::Visitor, Action::Delete)?;
    state.store.delete_visitor(id).await?;
    tracing::info!("Deleted visitor {}", id);
    Ok(Message::new("Visitor deleted"))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::routes::test_support::TestApp;

    #[tokio::test]
    async fn test_visitor_numbers_and_search() {
        let app = TestApp::new();
        let token = app.admin_token().await;

        let (status, first) = app
            .post(
                "/visitors",
                &token,
                json!({ "firstName": "Lydia", "lastName": "Thyatira", "visitDate": "2024-05-05" }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(first["visitorNumber"], "V00101");

        let (_, second) = app
            .post(
                "/visitors",
                &token,
                json!({ "firstName": "Cornelius", "lastName": "Caesarea", "invitedBy": "Peter" }),
            )
            .await;
        assert_eq!(second["visitorNumber"], "V00102");

        let (_, all) = app.get("/visitors", &token).await;
        assert_eq!(all.as_array().unwrap().len(), 2);
        assert_eq!(all[0]["visitorNumber"], "V00101");

        let (_, found) = app.get("/visitors?search=v00102", &token).await;
        assert_eq!(found.as_array().unwrap().len(), 1);
        assert_eq!(found[0]["invitedBy"], "Peter");
    }

    #[tokio::test]
    async fn test_delete_visitor() {
        let app = TestApp::new();
        let token = app.admin_token().await;
        let (_, lydia) = app
            .post("/visitors", &token, json!({ "firstName": "Lydia", "lastName": "Thyatira" }))
            .await;
        let id = lydia["id"].as_str().unwrap();

        let (status, body) = app.delete(&format!("/visitors/{id}"), &token).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Visitor deleted");

        let (status, _) = app.delete(&format!("/visitors/{id}"), &token).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
