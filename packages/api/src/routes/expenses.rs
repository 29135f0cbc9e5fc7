//! Expense categories and expenses. A category that still has expenses cannot
//! be deleted.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use store::models::{Expense, ExpenseCategory, ExpenseCategoryInput, ExpenseFilter, ExpenseInput};
use store::{Action, Resource};
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::error::{ApiResult, Message};
use crate::routes::{ApiJson, ApiPath, ApiQuery};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/expense-categories", get(list_categories).post(create_category))
        .route(
            "/expense-categories/{id}",
            get(show_category).put(update_category).delete(remove_category),
        )
        .route("/expenses", get(list).post(create))
        .route("/expenses/{id}", get(show).put(update).delete(remove))
}

async fn list_categories(
    user: CurrentUser,
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<ExpenseCategory>>> {
    user.require(Resource::ExpenseCategory, Action::View)?;
    Ok(Json(state.store.list_expense_categories().await?))
}

async fn show_category(
    user: CurrentUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<ExpenseCategory>> {
    user.require(Resource::ExpenseCategory, Action::View)?;
    Ok(Json(state.store.get_expense_category(id).await?))
}

async fn create_category(
    user: CurrentUser,
    State(state): State<AppState>,
    ApiJson(input): ApiJson<ExpenseCategoryInput>,
) -> ApiResult<(StatusCode, Json<ExpenseCategory>)> {
    user.require(Resource::ExpenseCategory, Action::Add)?;
    let category = state.store.create_expense_category(input).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

async fn update_category(
    user: CurrentUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(input): ApiJson<ExpenseCategoryInput>,
) -> ApiResult<Json<ExpenseCategory>> {
    user.require(Resource::ExpenseCategory, Action::Edit)?;
    Ok(Json(state.store.update_expense_category(id, input).await?))
}

async fn remove_category(
    user: CurrentUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Message>> {
    user.require(Resource::ExpenseCategory, Action::Delete)?;
    state.store.delete_expense_category(id).await?;
    Ok(Message::new("Expense category deleted"))
}

async fn list(
    user: CurrentUser,
    State(state): State<AppState>,
    ApiQuery(filter): ApiQuery<ExpenseFilter>,
) -> ApiResult<Json<Vec<Expense>>> {
    user.require(Resource::Expense, Action::View)?;
    Ok(Json(state.store.list_expenses(&filter).await?))
}

async fn show(
    user: CurrentUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Expense>> {
    user.require(Resource::Expense, Action::View)?;
    Ok(Json(state.store.get_expense(id).await?))
}

async fn create(
    user: CurrentUser,
    State(state): State<AppState>,
    ApiJson(input): ApiJson<ExpenseInput>,
) -> ApiResult<(StatusCode, Json<Expense>)> {
    user.require(Resource::Expense, Action::Add)?;
    let expense = state.store.create_expense(input).await?;
    tracing::info!("Recorded expense {} of {}", expense.description, expense.amount);
    Ok((StatusCode::CREATED, Json(expense)))
}

async fn update(
    user: CurrentUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(input): ApiJson<ExpenseInput>,
) -> ApiResult<Json<Expense>> {
    user.require(Resource::Expense, Action::Edit)?;
    Ok(Json(state.store.update_expense(id, input).await?))
}

async fn remove(
    user: CurrentUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Message>> {
    user.require(Resource::Expense, Action::Delete)?;
    state.store.delete_expense(id).await?;
    Ok(Message::new("Expense deleted"))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;
    use store::{PermissionFlags, Resource, ResourcePermissions};

    use crate::routes::test_support::TestApp;

    #[tokio::test]
    async fn test_category_with_expenses_is_protected() {
        let app = TestApp::new();
        let token = app.admin_token().await;

        let (status, utilities) = app
            .post("/expense-categories", &token, json!({ "name": "Utilities" }))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let cid = utilities["id"].as_str().unwrap().to_string();

        let (status, bill) = app
            .post(
                "/expenses",
                &token,
                json!({
                    "categoryId": cid,
                    "amount": "120.50",
                    "date": "2024-06-01",
                    "description": "Electricity"
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(bill["amount"], "120.50");

        let (status, _) = app.delete(&format!("/expense-categories/{cid}"), &token).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let eid = bill["id"].as_str().unwrap();
        let (status, _) = app.delete(&format!("/expenses/{eid}"), &token).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app.delete(&format!("/expense-categories/{cid}"), &token).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_expense_filters_and_validation() {
        let app = TestApp::new();
        let token = app.admin_token().await;
        let (_, a) = app.post("/expense-categories", &token, json!({ "name": "Rent" })).await;
        let (_, b) = app.post("/expense-categories", &token, json!({ "name": "Supplies" })).await;
        let (a, b) = (a["id"].as_str().unwrap(), b["id"].as_str().unwrap());

        for (cid, date) in [(a, "2024-01-01"), (b, "2024-01-15"), (a, "2024-02-01")] {
            let (status, _) = app
                .post(
                    "/expenses",
                    &token,
                    json!({ "categoryId": cid, "amount": 10, "date": date, "description": "x" }),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (_, rent) = app.get(&format!("/expenses?categoryId={a}"), &token).await;
        assert_eq!(rent.as_array().unwrap().len(), 2);
        let (_, january) = app.get("/expenses?from=2024-01-01&to=2024-01-31", &token).await;
        assert_eq!(january.as_array().unwrap().len(), 2);

        let (status, _) = app
            .post(
                "/expenses",
                &token,
                json!({
                    "categoryId": uuid::Uuid::new_v4(),
                    "amount": 10,
                    "date": "2024-01-01",
                    "description": "x"
                }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app
            .post(
                "/expenses",
                &token,
                json!({ "categoryId": a, "amount": 0, "date": "2024-01-01", "description": "x" }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_expense_and_category_flags_are_separate() {
        let app = TestApp::new();
        let token = app
            .token_with(
                "treasurer",
                PermissionFlags::none().with(Resource::Expense, ResourcePermissions::FULL),
            )
            .await;
        let (status, _) = app.get("/expenses", &token).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app.get("/expense-categories", &token).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
