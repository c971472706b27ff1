pub mod models;

pub use models::booking::{Booking, BookingStatus};
pub use models::events::{SeatEvent, SeatEventKind};
pub use models::rating::Rating;
pub use models::ride::{Ride, RideDraft, RideStatus, SeatHold};
pub use models::user::{User, UserRole};

/// Raised when a persisted status or role string does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
