use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Extension, Json, Router,
};
use futures_util::{Stream, StreamExt};
use tokio_stream::wrappers::BroadcastStream;
use tracing::warn;
use uuid::Uuid;

use unipool_core::Caller;
use unipool_inventory::RidePatch;
use unipool_shared::{Booking, BookingStatus, Rating, Ride, RideDraft};

use crate::error::AppError;
use crate::params::{ListParams, SearchParams};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/rides", post(publish_ride).get(search_rides))
        .route(
            "/rides/{id}",
            get(get_ride).patch(update_ride).delete(cancel_ride),
        )
        .route("/rides/{id}/start", post(start_ride))
        .route("/rides/{id}/complete", post(complete_ride))
        .route("/rides/{id}/cancel", post(cancel_ride))
        .route("/rides/{id}/bookings", get(list_ride_bookings))
        .route("/rides/{id}/ratings", get(list_ride_ratings))
        .route("/rides/{id}/events", get(ride_events))
}

async fn publish_ride(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(draft): Json<RideDraft>,
) -> Result<(StatusCode, Json<Ride>), AppError> {
    let ride = state.rides.publish(&caller, draft).await?;
    Ok((StatusCode::CREATED, Json(ride)))
}

async fn search_rides(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<Ride>>, AppError> {
    let rides = state.rides.search(&params.into()).await?;
    Ok(Json(rides))
}

async fn get_ride(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Ride>, AppError> {
    Ok(Json(state.rides.get(id).await?))
}

async fn update_ride(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
    Json(patch): Json<RidePatch>,
) -> Result<Json<Ride>, AppError> {
    Ok(Json(state.rides.update(id, &caller, patch).await?))
}

async fn start_ride(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
) -> Result<Json<Ride>, AppError> {
    Ok(Json(state.rides.start(id, &caller).await?))
}

async fn complete_ride(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
) -> Result<Json<Ride>, AppError> {
    Ok(Json(state.rides.complete(id, &caller).await?))
}

async fn cancel_ride(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
) -> Result<Json<Ride>, AppError> {
    Ok(Json(state.rides.cancel(id, &caller).await?))
}

async fn list_ride_bookings(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<Uuid>,
    Query(params): Query<ListParams<BookingStatus>>,
) -> Result<Json<Vec<Booking>>, AppError> {
    let bookings = state
        .bookings
        .list_for_ride(id, &caller, params.status, params.page())
        .await?;
    Ok(Json(bookings))
}

async fn list_ride_ratings(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Rating>>, AppError> {
    Ok(Json(state.ratings.list_for_ride(id).await?))
}

/// Live seat events for one ride
async fn ride_events(
    State(state): State<AppState>,
    Path(ride_id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, AppError> {
    state.rides.get(ride_id).await?;

    let rx = state.sse_tx.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(move |result| async move {
        match result {
            Ok(event) if event.ride_id == ride_id => Some(Event::default().json_data(&event)),
            Ok(_) => None,
            Err(e) => {
                warn!("SSE subscriber for ride {} fell behind: {}", ride_id, e);
                None
            }
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
