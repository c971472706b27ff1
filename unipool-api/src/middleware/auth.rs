use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use crate::{error::AppError, state::AppState};

/// Resolves the bearer token and injects the `Caller` into request extensions
pub async fn require_caller(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::to_owned)
        .ok_or_else(|| AppError::AuthenticationError("missing bearer token".to_string()))?;

    let caller = state.identity.resolve(&token).await?;

    req.extensions_mut().insert(caller);

    Ok(next.run(req).await)
}
