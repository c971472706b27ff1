use uuid::Uuid;

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatEventKind {
    Reserved,
    Confirmed,
    Released,
    RideStarted,
    RideCompleted,
    RideCancelled,
}

/// Emitted after a seat-affecting change has been committed
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct SeatEvent {
    pub ride_id: Uuid,
    pub booking_id: Option<Uuid>,
    pub kind: SeatEventKind,
    pub seats_available: i32,
    pub occurred_at: i64,
}

impl SeatEvent {
    pub fn new(ride_id: Uuid, booking_id: Option<Uuid>, kind: SeatEventKind, seats_available: i32) -> Self {
        Self {
            ride_id,
            booking_id,
            kind,
            seats_available,
            occurred_at: chrono::Utc::now().timestamp(),
        }
    }
}
