use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use unipool_core::repository::UserRepository;
use unipool_core::{Caller, CoreError};
use unipool_match::UserPatterns;
use unipool_shared::{Ride, RideStatus, User, UserRole};

use crate::error::AppError;
use crate::params::ListParams;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub full_name: String,
    pub email: String,
    pub role: UserRole,
}

/// Registration needs no token
pub fn public_routes() -> Router<AppState> {
    Router::new().route("/users", post(register))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users/{id}", get(get_user))
        .route("/users/{id}/rides", get(list_driver_rides))
        .route("/users/{id}/patterns", get(travel_patterns))
}

async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let full_name = req.full_name.trim();
    let email = req.email.trim().to_lowercase();
    if full_name.is_empty() {
        return Err(CoreError::ValidationError("full_name is required".to_string()).into());
    }
    if !email.contains('@') {
        return Err(CoreError::ValidationError(format!("invalid email: {}", email)).into());
    }

    let user = User::new(full_name.to_string(), email, req.role);
    state.gateway.insert_user(&user).await.map_err(CoreError::from)?;

    info!("Registered {} user {}", user.role, user.id);
    Ok((StatusCode::CREATED, Json(user)))
}

async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<User>, AppError> {
    let user = state
        .gateway
        .get_user(id)
        .await
        .map_err(CoreError::from)?
        .ok_or_else(|| CoreError::not_found("user", id))?;
    Ok(Json(user))
}

async fn list_driver_rides(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<ListParams<RideStatus>>,
) -> Result<Json<Vec<Ride>>, AppError> {
    let rides = state
        .rides
        .list_for_driver(id, params.status, params.page())
        .await?;
    Ok(Json(rides))
}

async fn travel_patterns(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
) -> Result<Json<UserPatterns>, AppError> {
    Ok(Json(state.patterns.analyze(id, &caller).await?))
}
