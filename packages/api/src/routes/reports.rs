use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::Deserialize;
use store::models::{DonationFilter, DonationReport};
use store::{Action, Resource};

use crate::auth::CurrentUser;
use crate::error::{ApiError, ApiResult};
use crate::routes::ApiQuery;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/reports/donations", get(donations))
}

#[derive(Debug, Default, Deserialize)]
pub struct PeriodQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// Donation totals over an optional inclusive date range, broken down by type.
async fn donations(
    user: CurrentUser,
    State(state): State<AppState>,
    ApiQuery(period): ApiQuery<PeriodQuery>,
) -> ApiResult<Json<DonationReport>> {
    user.require(Resource::Report, Action::View)?;
    if let (Some(from), Some(to)) = (period.from, period.to) {
        if from > to {
            return Err(ApiError::bad_request("from must not be after to"));
        }
    }

    let filter = DonationFilter {
        from: period.from,
        to: period.to,
        ..Default::default()
    };
    let donations = state.store.list_donations(&filter).await?;
    Ok(Json(DonationReport::summarize(period.from, period.to, &donations)))
}
