use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;
use tracing::debug;

use unipool_core::repository::{
    BookingRepository, RatingRepository, RideRepository, ScoreAggregate, StoreError, StoreResult,
    Transaction, UnitOfWork, UserIndex, UserRepository, Write,
};
use unipool_core::search::{contains_ignore_case, Page, RideQuery};
use unipool_shared::{Booking, BookingStatus, Rating, Ride, RideStatus, User};

#[derive(Default)]
struct Tables {
    rides: HashMap<Uuid, Ride>,
    bookings: HashMap<Uuid, Booking>,
    ratings: HashMap<Uuid, Rating>,
    users: HashMap<Uuid, User>,
}

/// In-process gateway used for tests and `store.backend = "memory"` runs.
///
/// Commits take the write lock, validate every write against the current
/// tables, and only then apply them, so a failed transaction leaves no trace.
/// A transaction may touch each ride or booking at most once.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn paginate<T>(items: Vec<T>, page: Page) -> Vec<T> {
    items.into_iter().skip(page.skip).take(page.limit).collect()
}

fn index_of(user: &mut User, index: UserIndex) -> &mut Vec<Uuid> {
    match index {
        UserIndex::RidesOffered => &mut user.rides_offered,
        UserIndex::Bookings => &mut user.bookings,
        UserIndex::RatingsReceived => &mut user.ratings_received,
    }
}

fn validate(tables: &Tables, write: &Write) -> StoreResult<()> {
    match write {
        Write::InsertRide(ride) => {
            if tables.rides.contains_key(&ride.id) {
                return Err(StoreError::Duplicate { entity: "ride", key: ride.id.to_string() });
            }
        }
        Write::UpdateRide { ride, expected_version } => {
            let stored = tables.rides.get(&ride.id).ok_or(StoreError::NotFound {
                entity: "ride",
                id: ride.id,
            })?;
            if stored.version != *expected_version {
                return Err(StoreError::VersionConflict { entity: "ride", id: ride.id });
            }
        }
        Write::InsertBooking(booking) => {
            if tables.bookings.contains_key(&booking.id) {
                return Err(StoreError::Duplicate { entity: "booking", key: booking.id.to_string() });
            }
        }
        Write::UpdateBooking { booking, expected_version } => {
            check_booking_version(tables, booking.id, *expected_version)?;
        }
        Write::DeleteBooking { id, expected_version } => {
            check_booking_version(tables, *id, *expected_version)?;
        }
        Write::InsertRating(rating) => {
            if tables.ratings.contains_key(&rating.id) {
                return Err(StoreError::Duplicate { entity: "rating", key: rating.id.to_string() });
            }
            // Once per (rater, rated, ride); ride-less ratings are unconstrained
            if let Some(ride_id) = rating.ride_id {
                let repeated = tables.ratings.values().any(|r| {
                    r.ride_id == Some(ride_id) && r.rater_id == rating.rater_id && r.rated_id == rating.rated_id
                });
                if repeated {
                    return Err(StoreError::Duplicate {
                        entity: "rating",
                        key: format!("{} -> {} on ride {}", rating.rater_id, rating.rated_id, ride_id),
                    });
                }
            }
        }
        Write::DeleteRating { id } => {
            if !tables.ratings.contains_key(id) {
                return Err(StoreError::NotFound { entity: "rating", id: *id });
            }
        }
        Write::IndexPush { user_id, .. } | Write::IndexPull { user_id, .. } => {
            if !tables.users.contains_key(user_id) {
                return Err(StoreError::NotFound { entity: "user", id: *user_id });
            }
        }
    }
    Ok(())
}

fn check_booking_version(tables: &Tables, id: Uuid, expected_version: i64) -> StoreResult<()> {
    let stored = tables
        .bookings
        .get(&id)
        .ok_or(StoreError::NotFound { entity: "booking", id })?;
    if stored.version != expected_version {
        return Err(StoreError::VersionConflict { entity: "booking", id });
    }
    Ok(())
}

fn apply(tables: &mut Tables, write: Write) {
    match write {
        Write::InsertRide(ride) => {
            tables.rides.insert(ride.id, ride);
        }
        Write::UpdateRide { mut ride, expected_version } => {
            ride.version = expected_version + 1;
            tables.rides.insert(ride.id, ride);
        }
        Write::InsertBooking(booking) => {
            tables.bookings.insert(booking.id, booking);
        }
        Write::UpdateBooking { mut booking, expected_version } => {
            booking.version = expected_version + 1;
            tables.bookings.insert(booking.id, booking);
        }
        Write::DeleteBooking { id, .. } => {
            tables.bookings.remove(&id);
        }
        Write::InsertRating(rating) => {
            tables.ratings.insert(rating.id, rating);
        }
        Write::DeleteRating { id } => {
            tables.ratings.remove(&id);
        }
        Write::IndexPush { user_id, index, entry } => {
            if let Some(user) = tables.users.get_mut(&user_id) {
                let ids = index_of(user, index);
                if !ids.contains(&entry) {
                    ids.push(entry);
                }
            }
        }
        Write::IndexPull { user_id, index, entry } => {
            if let Some(user) = tables.users.get_mut(&user_id) {
                index_of(user, index).retain(|id| *id != entry);
            }
        }
    }
}

#[async_trait]
impl RideRepository for MemoryStore {
    async fn get_ride(&self, id: Uuid) -> StoreResult<Option<Ride>> {
        Ok(self.tables.read().await.rides.get(&id).cloned())
    }

    async fn search_rides(&self, query: &RideQuery) -> StoreResult<Vec<Ride>> {
        let tables = self.tables.read().await;
        let mut rides: Vec<Ride> = tables
            .rides
            .values()
            .filter(|ride| query.matches(ride))
            .cloned()
            .collect();
        rides.sort_by(|a, b| a.departure_time.cmp(&b.departure_time).then(a.id.cmp(&b.id)));
        Ok(paginate(rides, query.page))
    }

    async fn list_rides_by_driver(
        &self,
        driver_id: Uuid,
        status: Option<RideStatus>,
        page: Page,
    ) -> StoreResult<Vec<Ride>> {
        let tables = self.tables.read().await;
        let mut rides: Vec<Ride> = tables
            .rides
            .values()
            .filter(|ride| ride.driver_id == driver_id)
            .filter(|ride| status.map_or(true, |s| ride.status == s))
            .cloned()
            .collect();
        rides.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(paginate(rides, page))
    }

    async fn list_rides_to_destination(&self, destination: &str) -> StoreResult<Vec<Ride>> {
        let tables = self.tables.read().await;
        let mut rides: Vec<Ride> = tables
            .rides
            .values()
            .filter(|ride| contains_ignore_case(&ride.destination, destination))
            .cloned()
            .collect();
        rides.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(rides)
    }
}

#[async_trait]
impl BookingRepository for MemoryStore {
    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        Ok(self.tables.read().await.bookings.get(&id).cloned())
    }

    async fn list_bookings_by_passenger(
        &self,
        passenger_id: Uuid,
        status: Option<BookingStatus>,
        page: Page,
    ) -> StoreResult<Vec<Booking>> {
        let tables = self.tables.read().await;
        let mut bookings: Vec<Booking> = tables
            .bookings
            .values()
            .filter(|b| b.passenger_id == passenger_id)
            .filter(|b| status.map_or(true, |s| b.status == s))
            .cloned()
            .collect();
        bookings.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(paginate(bookings, page))
    }

    async fn list_bookings_by_ride(
        &self,
        ride_id: Uuid,
        status: Option<BookingStatus>,
        page: Page,
    ) -> StoreResult<Vec<Booking>> {
        let tables = self.tables.read().await;
        let mut bookings: Vec<Booking> = tables
            .bookings
            .values()
            .filter(|b| b.ride_id == ride_id)
            .filter(|b| status.map_or(true, |s| b.status == s))
            .cloned()
            .collect();
        bookings.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(paginate(bookings, page))
    }
}

#[async_trait]
impl RatingRepository for MemoryStore {
    async fn get_rating(&self, id: Uuid) -> StoreResult<Option<Rating>> {
        Ok(self.tables.read().await.ratings.get(&id).cloned())
    }

    async fn list_ratings_received(&self, rated_id: Uuid, page: Page) -> StoreResult<Vec<Rating>> {
        let tables = self.tables.read().await;
        let mut ratings: Vec<Rating> = tables
            .ratings
            .values()
            .filter(|r| r.rated_id == rated_id)
            .cloned()
            .collect();
        ratings.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(paginate(ratings, page))
    }

    async fn list_ratings_for_ride(&self, ride_id: Uuid) -> StoreResult<Vec<Rating>> {
        let tables = self.tables.read().await;
        let mut ratings: Vec<Rating> = tables
            .ratings
            .values()
            .filter(|r| r.ride_id == Some(ride_id))
            .cloned()
            .collect();
        ratings.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(ratings)
    }

    async fn aggregate_scores(&self, rated_id: Uuid) -> StoreResult<ScoreAggregate> {
        let tables = self.tables.read().await;
        let scores: Vec<i32> = tables
            .ratings
            .values()
            .filter(|r| r.rated_id == rated_id)
            .map(|r| r.score)
            .collect();
        let count = scores.len() as i64;
        let average = if scores.is_empty() {
            None
        } else {
            Some(scores.iter().map(|s| *s as f64).sum::<f64>() / scores.len() as f64)
        };
        Ok(ScoreAggregate { count, average })
    }
}

#[async_trait]
impl UserRepository for MemoryStore {
    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.id == user.id || u.email == user.email) {
            return Err(StoreError::Duplicate { entity: "user", key: user.email.clone() });
        }
        tables.users.insert(user.id, user.clone());
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for MemoryStore {
    async fn commit(&self, tx: Transaction) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        for write in tx.writes() {
            validate(&tables, write)?;
        }
        let writes = tx.into_writes();
        debug!("Applying {} writes", writes.len());
        for write in writes {
            apply(&mut tables, write);
        }
        Ok(())
    }
}
