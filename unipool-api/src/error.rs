use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use unipool_core::CoreError;

#[derive(Debug)]
pub enum AppError {
    AuthenticationError(String),
    AuthorizationError(String),
    ValidationError(String),
    NotFoundError(String),
    ConflictError(String),
    InternalServerError(String),
    Anyhow(anyhow::Error),
}

impl AppError {
    fn from_core(err: CoreError) -> Self {
        let msg = err.to_string();
        match err {
            CoreError::NotFound { .. } => AppError::NotFoundError(msg),
            CoreError::Forbidden(_) => AppError::AuthorizationError(msg),
            CoreError::Unauthenticated(_) => AppError::AuthenticationError(msg),
            CoreError::InvalidSeatCount(_)
            | CoreError::InvalidScore(_)
            | CoreError::InvalidRelationship(_)
            | CoreError::ValidationError(_) => AppError::ValidationError(msg),
            CoreError::Conflict(_)
            | CoreError::Duplicate(_)
            | CoreError::InsufficientCapacity { .. }
            | CoreError::RideNotBookable(_)
            | CoreError::InvalidTransition { .. } => AppError::ConflictError(msg),
            CoreError::CorruptRecord(_) | CoreError::Store(_) => AppError::InternalServerError(msg),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::AuthenticationError(_) => StatusCode::UNAUTHORIZED,
            AppError::AuthorizationError(_) => StatusCode::FORBIDDEN,
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::NotFoundError(_) => StatusCode::NOT_FOUND,
            AppError::ConflictError(_) => StatusCode::CONFLICT,
            AppError::InternalServerError(_) | AppError::Anyhow(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = match self {
            AppError::AuthenticationError(msg)
            | AppError::AuthorizationError(msg)
            | AppError::ValidationError(msg)
            | AppError::NotFoundError(msg)
            | AppError::ConflictError(msg) => msg,
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                "Internal Server Error".to_string()
            }
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {:#}", err);
                "Internal Server Error".to_string()
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

// Domain errors keep their meaning; anything else is an internal failure
impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        match err.into().downcast::<CoreError>() {
            Ok(core) => Self::from_core(core),
            Err(other) => Self::Anyhow(other),
        }
    }
}
