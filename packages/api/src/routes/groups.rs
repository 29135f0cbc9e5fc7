//! Groups and their many-to-many membership.
//!
//! `PUT /groups/{id}` replaces the whole member set from `memberIds`; the
//! `/groups/{id}/members` endpoints add or remove one member at a time. Adding
//! a member twice is a no-op. Both count as editing the group.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use store::models::{Group, GroupInput};
use store::{Action, Resource};
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::error::{ApiResult, Message};
use crate::routes::{ApiJson, ApiPath};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/groups", get(list).post(create))
        .route("/groups/{id}", get(show).put(update).delete(remove))
        .route("/groups/{id}/members", post(add_member))
        .route("/groups/{id}/members/{member_id}", delete(remove_member))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMemberRequest {
    pub member_id: Uuid,
}

async fn list(user: CurrentUser, State(state): State<AppState>) -> ApiResult<Json<Vec<Group>>> {
    user.require(Resource::Group, Action::View)?;
    Ok(Json(state.store.list_groups().await?))
}

async fn show(
    user: CurrentUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Group>> {
    user.require(Resource::Group, Action::View)?;
    Ok(Json(state.store.get_group(id).await?))
}

async fn create(
    user: CurrentUser,
    State(state): State<AppState>,
    ApiJson(input): ApiJson<GroupInput>,
) -> ApiResult<(StatusCode, Json<Group>)> {
    user.require(Resource::Group, Action::Add)?;
    let group = state.store.create_group(input).await?;
    tracing::info!("Created group {} with {} members", group.name, group.members.len());
    Ok((StatusCode::CREATED, Json(group)))
}

async fn update(
    user: CurrentUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(input): ApiJson<GroupInput>,
) -> ApiResult<Json<Group>> {
    user.require(Resource::Group, Action::Edit)?;
    Ok(Json(state.store.update_group(id, input).await?))
}

async fn remove(
    user: CurrentUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Message>> {
    user.require(Resource::Group, Action::Delete)?;
    state.store.delete_group(id).await?;
    Ok(Message::new("Group deleted"))
}

async fn add_member(
    user: CurrentUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<AddMemberRequest>,
) -> ApiResult<Json<Group>> {
    user.require(Resource::Group, Action::Edit)?;
    Ok(Json(state.store.add_group_member(id, req.member_id).await?))
}

async fn remove_member(
    user: CurrentUser,
    State(state): State<AppState>,
    ApiPath((id, member_id)): ApiPath<(Uuid, Uuid)>,
) -> ApiResult<Json<Group>> {
    user.require(Resource::Group, Action::Edit)?;
    Ok(Json(state.store.remove_group_member(id, member_id).await?))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::{json, Value};

    use crate::routes::test_support::TestApp;

    fn numbers(group: &Value) -> Vec<&str> {
        group["members"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["memberNumber"].as_str().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_group_membership_follows_associations() {
        let app = TestApp::new();
        let token = app.admin_token().await;

        let mut ids = Vec::new();
        for name in ["Peter", "Andrew", "James"] {
            let (_, m) = app
                .post("/members", &token, json!({ "firstName": name, "lastName": "Galilee" }))
                .await;
            ids.push(m["id"].as_str().unwrap().to_string());
        }

        let (status, group) = app
            .post(
                "/groups",
                &token,
                json!({ "name": "Choir", "memberIds": [ids[1], ids[0], ids[1]] }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(numbers(&group), vec!["00101", "00102"]);
        let gid = group["id"].as_str().unwrap().to_string();

        let (status, group) = app
            .post(&format!("/groups/{gid}/members"), &token, json!({ "memberId": ids[2] }))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(numbers(&group), vec!["00101", "00102", "00103"]);

        let (_, group) = app
            .post(&format!("/groups/{gid}/members"), &token, json!({ "memberId": ids[2] }))
            .await;
        assert_eq!(numbers(&group).len(), 3);

        let (status, group) = app
            .delete(&format!("/groups/{gid}/members/{}", ids[0]), &token)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(numbers(&group), vec!["00102", "00103"]);

        let (status, _) = app
            .delete(&format!("/groups/{gid}/members/{}", ids[0]), &token)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = app.delete(&format!("/members/{}", ids[1]), &token).await;
        assert_eq!(status, StatusCode::OK);
        let (_, group) = app.get(&format!("/groups/{gid}"), &token).await;
        assert_eq!(numbers(&group), vec!["00103"]);

        let (status, group) = app
            .put(
                &format!("/groups/{gid}"),
                &token,
                json!({ "name": "Choir", "description": "Sundays", "memberIds": [] }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(numbers(&group).is_empty());
        assert_eq!(group["description"], "Sundays");
    }

    #[tokio::test]
    async fn test_group_rejects_unknown_members() {
        let app = TestApp::new();
        let token = app.admin_token().await;
        let (status, _) = app
            .post(
                "/groups",
                &token,
                json!({ "name": "Ushers", "memberIds": [uuid::Uuid::new_v4()] }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, list) = app.get("/groups", &token).await;
        assert!(list.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_group() {
        let app = TestApp::new();
        let token = app.admin_token().await;
        let (_, group) = app.post("/groups", &token, json!({ "name": "Ushers" })).await;
        let gid = group["id"].as_str().unwrap();

        let (status, _) = app.delete(&format!("/groups/{gid}"), &token).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app.get(&format!("/groups/{gid}"), &token).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
