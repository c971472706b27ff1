use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

use crate::ParseEnumError;

/// Ride status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RideStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl RideStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RideStatus::Pending => "PENDING",
            RideStatus::InProgress => "IN_PROGRESS",
            RideStatus::Completed => "COMPLETED",
            RideStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for RideStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RideStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(RideStatus::Pending),
            "IN_PROGRESS" => Ok(RideStatus::InProgress),
            "COMPLETED" => Ok(RideStatus::Completed),
            "CANCELLED" => Ok(RideStatus::Cancelled),
            other => Err(ParseEnumError::new("ride status", other)),
        }
    }
}

/// Seats held on a ride on behalf of one booking.
///
/// A hold exists from the moment a booking is created until it is rejected,
/// cancelled or deleted. `confirmed` flips when the driver accepts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeatHold {
    pub booking_id: Uuid,
    pub passenger_id: Uuid,
    pub seats: i32,
    pub confirmed: bool,
}

/// A driver-published trip offer with its seat inventory.
///
/// `seats_available`, `passengers` and `seat_holds` are written only by the
/// seat ledger; everything else belongs to the driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ride {
    pub id: Uuid,
    pub driver_id: Uuid,
    pub origin: String,
    pub destination: String,
    pub description: Option<String>,
    pub departure_time: DateTime<Utc>,
    pub total_seats: i32,
    pub seats_available: i32,
    /// Price per seat in cents
    pub price_cents: i32,
    pub status: RideStatus,
    pub passengers: Vec<Uuid>,
    pub seat_holds: Vec<SeatHold>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Driver-supplied fields of a new ride
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RideDraft {
    pub origin: String,
    pub destination: String,
    pub description: Option<String>,
    pub departure_time: DateTime<Utc>,
    pub total_seats: i32,
    pub price_cents: i32,
}

impl Ride {
    pub fn new(driver_id: Uuid, draft: RideDraft) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            driver_id,
            origin: draft.origin,
            destination: draft.destination,
            description: draft.description,
            departure_time: draft.departure_time,
            total_seats: draft.total_seats,
            seats_available: draft.total_seats,
            price_cents: draft.price_cents,
            status: RideStatus::Pending,
            passengers: Vec::new(),
            seat_holds: Vec::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_bookable(&self) -> bool {
        self.status == RideStatus::Pending
    }

    pub fn hold_for(&self, booking_id: Uuid) -> Option<&SeatHold> {
        self.seat_holds.iter().find(|h| h.booking_id == booking_id)
    }

    pub fn held_seats(&self) -> i32 {
        self.seat_holds.iter().map(|h| h.seats).sum()
    }

    /// Whether the user holds an accepted seat on this ride
    pub fn has_confirmed_passenger(&self, user_id: Uuid) -> bool {
        self.seat_holds
            .iter()
            .any(|h| h.passenger_id == user_id && h.confirmed)
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
