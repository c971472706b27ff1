use async_trait::async_trait;
use uuid::Uuid;
use unipool_shared::{Booking, BookingStatus, Rating, Ride, RideStatus, User};

use crate::search::{Page, RideQuery};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },
    #[error("{entity} {id} was modified concurrently")]
    VersionConflict { entity: &'static str, id: Uuid },
    #[error("{entity} already exists: {key}")]
    Duplicate { entity: &'static str, key: String },
    #[error("{entity} {id} is malformed: {reason}")]
    Corrupt {
        entity: &'static str,
        id: String,
        reason: String,
    },
    #[error("Storage backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Denormalized per-user id lists
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserIndex {
    RidesOffered,
    Bookings,
    RatingsReceived,
}

/// One write inside a [`Transaction`].
///
/// Updates and deletes carry the version the caller read. The gateway
/// rejects the whole transaction if any stored version differs, and stores
/// updated records with `expected_version + 1`.
#[derive(Debug, Clone)]
pub enum Write {
    InsertRide(Ride),
    UpdateRide { ride: Ride, expected_version: i64 },
    InsertBooking(Booking),
    UpdateBooking { booking: Booking, expected_version: i64 },
    DeleteBooking { id: Uuid, expected_version: i64 },
    InsertRating(Rating),
    DeleteRating { id: Uuid },
    IndexPush { user_id: Uuid, index: UserIndex, entry: Uuid },
    IndexPull { user_id: Uuid, index: UserIndex, entry: Uuid },
}

/// An all-or-nothing batch of writes
#[derive(Debug, Clone, Default)]
pub struct Transaction {
    writes: Vec<Write>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_ride(&mut self, ride: Ride) -> &mut Self {
        self.writes.push(Write::InsertRide(ride));
        self
    }

    /// Versioned update; `ride.version` must still be the version that was read
    pub fn update_ride(&mut self, ride: Ride) -> &mut Self {
        let expected_version = ride.version;
        self.writes.push(Write::UpdateRide { ride, expected_version });
        self
    }

    pub fn insert_booking(&mut self, booking: Booking) -> &mut Self {
        self.writes.push(Write::InsertBooking(booking));
        self
    }

    pub fn update_booking(&mut self, booking: Booking) -> &mut Self {
        let expected_version = booking.version;
        self.writes.push(Write::UpdateBooking { booking, expected_version });
        self
    }

    pub fn delete_booking(&mut self, booking: &Booking) -> &mut Self {
        self.writes.push(Write::DeleteBooking {
            id: booking.id,
            expected_version: booking.version,
        });
        self
    }

    pub fn insert_rating(&mut self, rating: Rating) -> &mut Self {
        self.writes.push(Write::InsertRating(rating));
        self
    }

    pub fn delete_rating(&mut self, id: Uuid) -> &mut Self {
        self.writes.push(Write::DeleteRating { id });
        self
    }

    pub fn index_push(&mut self, user_id: Uuid, index: UserIndex, entry: Uuid) -> &mut Self {
        self.writes.push(Write::IndexPush { user_id, index, entry });
        self
    }

    pub fn index_pull(&mut self, user_id: Uuid, index: UserIndex, entry: Uuid) -> &mut Self {
        self.writes.push(Write::IndexPull { user_id, index, entry });
        self
    }

    pub fn writes(&self) -> &[Write] {
        &self.writes
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn into_writes(self) -> Vec<Write> {
        self.writes
    }
}

/// Repository trait for ride data access
#[async_trait]
pub trait RideRepository: Send + Sync {
    async fn get_ride(&self, id: Uuid) -> StoreResult<Option<Ride>>;

    /// Pending rides matching the query, case-insensitive on text fields
    async fn search_rides(&self, query: &RideQuery) -> StoreResult<Vec<Ride>>;

    async fn list_rides_by_driver(
        &self,
        driver_id: Uuid,
        status: Option<RideStatus>,
        page: Page,
    ) -> StoreResult<Vec<Ride>>;

    /// Rides in any status whose destination contains `destination`, case-insensitive
    async fn list_rides_to_destination(&self, destination: &str) -> StoreResult<Vec<Ride>>;
}

/// Repository trait for booking data access
#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>>;

    async fn list_bookings_by_passenger(
        &self,
        passenger_id: Uuid,
        status: Option<BookingStatus>,
        page: Page,
    ) -> StoreResult<Vec<Booking>>;

    async fn list_bookings_by_ride(
        &self,
        ride_id: Uuid,
        status: Option<BookingStatus>,
        page: Page,
    ) -> StoreResult<Vec<Booking>>;
}

/// Count and mean of the scores a user has received
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreAggregate {
    pub count: i64,
    pub average: Option<f64>,
}

/// Repository trait for rating data access
#[async_trait]
pub trait RatingRepository: Send + Sync {
    async fn get_rating(&self, id: Uuid) -> StoreResult<Option<Rating>>;

    async fn list_ratings_received(&self, rated_id: Uuid, page: Page) -> StoreResult<Vec<Rating>>;

    async fn list_ratings_for_ride(&self, ride_id: Uuid) -> StoreResult<Vec<Rating>>;

    async fn aggregate_scores(&self, rated_id: Uuid) -> StoreResult<ScoreAggregate>;
}

/// Repository trait for user data access
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>>;

    async fn insert_user(&self, user: &User) -> StoreResult<()>;
}

/// Atomic multi-record writes
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    /// Apply every write or none of them
    async fn commit(&self, tx: Transaction) -> StoreResult<()>;
}

/// Everything the domain crates need from persistence
pub trait Gateway:
    RideRepository + BookingRepository + RatingRepository + UserRepository + UnitOfWork
{
}

impl<T> Gateway for T where
    T: RideRepository + BookingRepository + RatingRepository + UserRepository + UnitOfWork
{
}
