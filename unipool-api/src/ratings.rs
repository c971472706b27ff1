use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use unipool_core::Caller;
use unipool_rating::RatingSummary;
use unipool_shared::Rating;

use crate::error::AppError;
use crate::params::PageParams;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateRatingRequest {
    pub rated_id: Uuid,
    pub ride_id: Uuid,
    pub score: i32,
    pub comment: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/ratings", post(create_rating))
        .route("/ratings/{id}", get(get_rating).delete(delete_rating))
        .route("/users/{id}/ratings", get(list_received))
        .route("/users/{id}/rating", get(rating_summary))
}

async fn create_rating(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<CreateRatingRequest>,
) -> Result<(StatusCode, Json<Rating>), AppError> {
    let rating = state
        .ratings
        .record(&caller, req.rated_id, req.ride_id, req.score, req.comment)
        .await?;
    Ok((StatusCode::CREATED, Json(rating)))
}

async fn get_rating(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Rating>, AppError> {
    Ok(Json(state.ratings.get(id).await?))
}

async fn delete_rating(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.ratings.delete(id, &caller).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_received(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(params): Query<PageParams>,
) -> Result<Json<Vec<Rating>>, AppError> {
    Ok(Json(state.ratings.list_received(user_id, params.page()).await?))
}

async fn rating_summary(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<RatingSummary>, AppError> {
    Ok(Json(state.ratings.summary_for(user_id).await?))
}
