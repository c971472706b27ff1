use axum::{http::Method, middleware::from_fn_with_state, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod auth;
pub mod bookings;
pub mod error;
pub mod matching;
pub mod middleware;
pub mod params;
pub mod ratings;
pub mod rides;
pub mod state;
pub mod users;

pub use auth::{Claims, JwtIdentityResolver};
pub use state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    let protected = Router::new()
        .merge(rides::routes())
        .merge(bookings::routes())
        .merge(ratings::routes())
        .merge(users::routes())
        .merge(matching::routes())
        .route_layer(from_fn_with_state(state.clone(), middleware::require_caller));

    Router::new()
        .merge(users::public_routes())
        .merge(protected)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
