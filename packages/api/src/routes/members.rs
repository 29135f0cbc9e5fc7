use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use store::models::{Member, MemberInput};
use store::{Action, Resource};
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::error::{ApiResult, Message};
use crate::routes::{ApiJson, ApiPath, ApiQuery};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/members", get(list).post(create))
        .route("/members/{id}", get(show).put(update).delete(remove))
}

/// `?search=` matches name, member number or email, ignoring case.
#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub search: Option<String>,
}

async fn list(
    user: CurrentUser,
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<SearchQuery>,
) -> ApiResult<Json<Vec<Member>>> {
    user.require(Resource::Member, Action::View)?;
    Ok(Json(state.store.list_members(query.search.as_deref()).await?))
}

async fn show(
    user: CurrentUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Member>> {
    user.require(Resource::Member, Action::View)?;
    Ok(Json(state.store.get_member(id).await?))
}

async fn create(
    user: CurrentUser,
    State(state): State<AppState>,
    ApiJson(input): ApiJson<MemberInput>,
) -> ApiResult<(StatusCode, Json<Member>)> {
    user.require(Resource::Member, Action::Add)?;
    let member = state.store.create_member(input).await?;
    tracing::info!("Created member {}", member.member_number);
    Ok((StatusCode::CREATED, Json(member)))
}

async fn update(
    user: CurrentUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(input): ApiJson<MemberInput>,
) -> ApiResult<Json<Member>> {
    user.require(Resource::Member, Action::Edit)?;
    Ok(Json(state.store.update_member(id, input).await?))
}

async fn remove(
    user: CurrentUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Message>> {
    user.require(Resource::Member, Action::Delete)?;
    state.store.delete_member(id).await?;
    tracing::info!("Deleted member {}", id);
    Ok(Message::new("Member deleted"))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;
    use store::{PermissionFlags, Resource, ResourcePermissions};

    use crate::routes::test_support::TestApp;

    #[tokio::test]
    async fn test_member_crud() {
        let app = TestApp::new();
        let token = app.admin_token().await;

        let (status, ruth) = app
            .post("/members", &token, json!({ "firstName": "Ruth", "lastName": "Moab" }))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(ruth["memberNumber"], "00101");

        let (_, boaz) = app
            .post(
                "/members",
                &token,
                json!({ "firstName": "Boaz", "lastName": "Bethlehem", "joinDate": "2024-02-01" }),
            )
            .await;
        assert_eq!(boaz["memberNumber"], "00102");
        assert_eq!(boaz["joinDate"], "2024-02-01");

        let (_, found) = app.get("/members?search=MOAB", &token).await;
        assert_eq!(found.as_array().unwrap().len(), 1);
        assert_eq!(found[0]["firstName"], "Ruth");

        let id = ruth["id"].as_str().unwrap();
        let (status, updated) = app
            .put(
                &format!("/members/{id}"),
                &token,
                json!({ "firstName": "Ruth", "lastName": "Moab", "phone": "555-0101" }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["phone"], "555-0101");
        assert_eq!(updated["memberNumber"], "00101");

        let (status, _) = app.delete(&format!("/members/{id}"), &token).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = app.get(&format!("/members/{id}"), &token).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "member not found");
    }

    #[tokio::test]
    async fn test_member_validation() {
        let app = TestApp::new();
        let token = app.admin_token().await;

        let (status, body) = app
            .post("/members", &token, json!({ "firstName": "Ruth", "lastName": "" }))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("lastName"));

        let (status, body) = app.post("/members", &token, json!({ "firstName": 3 })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let (status, _) = app.get("/members/not-a-uuid", &token).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_member_permissions() {
        let app = TestApp::new();
        let admin = app.admin_token().await;
        let (_, ruth) = app
            .post("/members", &admin, json!({ "firstName": "Ruth", "lastName": "Moab" }))
            .await;
        let id = ruth["id"].as_str().unwrap();

        let (status, _) = app.get("/members", "bogus-token").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let nobody = app.token_with("nobody", PermissionFlags::none()).await;
        let (status, _) = app.get("/members", &nobody).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let reader = app
            .token_with(
                "reader",
                PermissionFlags::none().with(Resource::Member, ResourcePermissions::READ_ONLY),
            )
            .await;
        let (status, _) = app.get("/members", &reader).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app
            .post("/members", &reader, json!({ "firstName": "Orpah", "lastName": "Moab" }))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = app.delete(&format!("/members/{id}"), &reader).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        // Access without cannotDelete may delete; editing needs only access.
        let editor = app
            .token_with(
                "editor",
                PermissionFlags::none().with(
                    Resource::Member,
                    ResourcePermissions {
                        access: true,
                        can_add: false,
                        cannot_delete: false,
                    },
                ),
            )
            .await;
        let (status, _) = app
            .put(
                &format!("/members/{id}"),
                &editor,
                json!({ "firstName": "Ruth", "lastName": "of Moab" }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app.delete(&format!("/members/{id}"), &editor).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_member_with_donations_cannot_be_deleted() {
        let app = TestApp::new();
        let token = app.admin_token().await;
        let (_, ruth) = app
            .post("/members", &token, json!({ "firstName": "Ruth", "lastName": "Moab" }))
            .await;
        let id = ruth["id"].as_str().unwrap();
        let (status, _) = app
            .post(
                "/donations",
                &token,
                json!({
                    "amount": "10.00",
                    "donationType": "Tithe",
                    "date": "2024-03-03",
                    "memberId": id
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, _) = app.delete(&format!("/members/{id}"), &token).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }
}
