use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use store::models::{Donation, DonationFilter, DonationInput};
use store::{Action, Resource};
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::error::{ApiResult, Message};
use crate::routes::{ApiJson, ApiPath, ApiQuery};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/donations", get(list).post(create))
        .route("/donations/{id}", get(show).put(update).delete(remove))
}

/// Newest first. Filters: `memberId`, `visitorId`, `from`, `to` (inclusive dates).
async fn list(
    user: CurrentUser,
    State(state): State<AppState>,
    ApiQuery(filter): ApiQuery<DonationFilter>,
) -> ApiResult<Json<Vec<Donation>>> {
    user.require(Resource::Donation, Action::View)?;
    Ok(Json(state.store.list_donations(&filter).await?))
}

async fn show(
    user: CurrentUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Donation>> {
    user.require(Resource::Donation, Action::View)?;
    Ok(Json(state.store.get_donation(id).await?))
}

async fn create(
    user: CurrentUser,
    State(state): State<AppState>,
    ApiJson(input): ApiJson<DonationInput>,
) -> ApiResult<(StatusCode, Json<Donation>)> {
    user.require(Resource::Donation, Action::Add)?;
    let donation = state.store.create_donation(input).await?;
    tracing::info!("Recorded {} donation of {}", donation.donation_type, donation.amount);
    Ok((StatusCode::CREATED, Json(donation)))
}

async fn update(
    user: CurrentUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(input): ApiJson<DonationInput>,
) -> ApiResult<Json<Donation>> {
    user.require(Resource::Donation, Action::Edit)?;
    Ok(Json(state.store.update_donation(id, input).await?))
}

async fn remove(
    user: CurrentUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Message>> {
    user.require(Resource::Donation, Action::Delete)?;
    state.store.delete_donation(id).await?;
    Ok(Message::new("Donation deleted"))
}
