use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use unipool_core::Caller;
use unipool_shared::{Booking, BookingStatus};

use crate::error::AppError;
use crate::params::ListParams;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub ride_id: Uuid,
    pub seats: i32,
}

#[derive(Debug, Deserialize)]
pub struct UpdateBookingRequest {
    pub status: BookingStatus,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/bookings", post(create_booking))
        .route(
            "/bookings/{id}",
            get(get_booking).patch(update_booking).delete(delete_booking),
        )
        .route("/users/{id}/bookings", get(list_passenger_bookings))
}

async fn create_booking(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    let booking = state.bookings.create(&caller, req.ride_id, req.seats).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

async fn get_booking(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.bookings.get(id, &caller).await?))
}

async fn update_booking(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateBookingRequest>,
) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.bookings.set_status(id, req.status, &caller).await?))
}

async fn delete_booking(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.bookings.delete(id, &caller).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_passenger_bookings(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(user_id): Path<Uuid>,
    Query(params): Query<ListParams<BookingStatus>>,
) -> Result<Json<Vec<Booking>>, AppError> {
    let bookings = state
        .bookings
        .list_for_passenger(user_id, &caller, params.status, params.page())
        .await?;
    Ok(Json(bookings))
}
