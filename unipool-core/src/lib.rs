pub mod search;
pub mod repository;
pub mod identity;
pub mod retry;

use std::fmt;
use unipool_shared::RideStatus;

pub use identity::{Caller, IdentityResolver};
pub use retry::retry_on_conflict;
pub use repository::{Gateway, StoreError, Transaction, UserIndex, Write};
pub use search::{Page, RideQuery};

/// Why a ride refused a new booking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotBookableReason {
    Status(RideStatus),
    SelfBookingForbidden,
}

impl fmt::Display for NotBookableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotBookableReason::Status(status) => write!(f, "ride is {}", status),
            NotBookableReason::SelfBookingForbidden => f.write_str("drivers cannot book their own ride"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Authentication failed: {0}")]
    Unauthenticated(String),
    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
    #[error("Insufficient capacity: requested {requested}, available {available}")]
    InsufficientCapacity { requested: i32, available: i32 },
    #[error("Ride not bookable: {0}")]
    RideNotBookable(NotBookableReason),
    #[error("Invalid seat count: {0}")]
    InvalidSeatCount(i32),
    #[error("Invalid score {0}: must be between 1 and 5")]
    InvalidScore(i32),
    #[error("Invalid rating relationship: {0}")]
    InvalidRelationship(String),
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Concurrent update conflict: {0}")]
    Conflict(String),
    #[error("Already exists: {0}")]
    Duplicate(String),
    #[error("Corrupt record: {0}")]
    CorruptRecord(String),
    #[error("Storage error: {0}")]
    Store(String),
}

impl CoreError {
    pub fn not_found(entity: &'static str, id: impl fmt::Display) -> Self {
        CoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn invalid_transition(from: impl fmt::Display, to: impl fmt::Display) -> Self {
        CoreError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => CoreError::NotFound {
                entity,
                id: id.to_string(),
            },
            StoreError::VersionConflict { .. } => CoreError::Conflict(err.to_string()),
            StoreError::Duplicate { .. } => CoreError::Duplicate(err.to_string()),
            StoreError::Corrupt { .. } => CoreError::CorruptRecord(err.to_string()),
            StoreError::Backend(msg) => CoreError::Store(msg),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
