use axum::{
    extract::{Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;

use unipool_core::Caller;
use unipool_match::{MatchRequest, PickupSuggestion, ScoredRide};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PickupParams {
    pub destination: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/matches", post(find_matches))
        .route("/pickups", get(recommend_pickups))
}

async fn find_matches(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<MatchRequest>,
) -> Result<Json<Vec<ScoredRide>>, AppError> {
    Ok(Json(state.matcher.find_matches(&caller, &req).await?))
}

async fn recommend_pickups(
    State(state): State<AppState>,
    Query(params): Query<PickupParams>,
) -> Result<Json<Vec<PickupSuggestion>>, AppError> {
    Ok(Json(state.pickups.recommend(&params.destination).await?))
}
