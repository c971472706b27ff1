use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use std::fmt;
use tracing::{debug, warn};
use uuid::Uuid;

use unipool_core::repository::{
    BookingRepository, RatingRepository, RideRepository, ScoreAggregate, StoreError, StoreResult,
    Transaction, UnitOfWork, UserIndex, UserRepository, Write,
};
use unipool_core::search::{Page, RideQuery};
use unipool_shared::{Booking, BookingStatus, Rating, Ride, RideStatus, SeatHold, User, UserRole};

const RIDE_COLUMNS: &str = "id, driver_id, origin, destination, description, departure_time, \
    total_seats, seats_available, price_cents, status, passengers, seat_holds, version, created_at, updated_at";
const BOOKING_COLUMNS: &str = "id, ride_id, passenger_id, seats, status, version, created_at, updated_at";
const RATING_COLUMNS: &str = "id, rater_id, rated_id, ride_id, score, comment, created_at";
const USER_COLUMNS: &str = "id, full_name, email, role, rides_offered, bookings, ratings_received, created_at";

/// PostgreSQL-backed gateway
pub struct PgGateway {
    pool: PgPool,
}

impl PgGateway {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
struct RideRow {
    id: Uuid,
    driver_id: Uuid,
    origin: String,
    destination: String,
    description: Option<String>,
    departure_time: DateTime<Utc>,
    total_seats: i32,
    seats_available: i32,
    price_cents: i32,
    status: String,
    passengers: Vec<Uuid>,
    seat_holds: serde_json::Value,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    ride_id: Uuid,
    passenger_id: Uuid,
    seats: i32,
    status: String,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct RatingRow {
    id: Uuid,
    rater_id: Uuid,
    rated_id: Uuid,
    ride_id: Option<Uuid>,
    score: i32,
    comment: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    full_name: String,
    email: String,
    role: String,
    rides_offered: Vec<Uuid>,
    bookings: Vec<Uuid>,
    ratings_received: Vec<Uuid>,
    created_at: DateTime<Utc>,
}

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

/// Row an insert points at, named by the foreign-key constraint guarding it
struct ParentRef {
    constraint: &'static str,
    entity: &'static str,
    id: Uuid,
}

impl ParentRef {
    fn new(constraint: &'static str, entity: &'static str, id: Uuid) -> Self {
        Self {
            constraint,
            entity,
            id,
        }
    }
}

fn insert_failed(
    entity: &'static str,
    key: impl fmt::Display,
    parents: &[ParentRef],
    err: sqlx::Error,
) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return StoreError::Duplicate {
                entity,
                key: key.to_string(),
            };
        }
        if db.is_foreign_key_violation() {
            let parent = db
                .constraint()
                .and_then(|name| parents.iter().find(|p| p.constraint == name))
                .or_else(|| parents.first());
            if let Some(parent) = parent {
                return StoreError::NotFound {
                    entity: parent.entity,
                    id: parent.id,
                };
            }
        }
    }
    backend(err)
}

/// LIMIT/OFFSET bind value; saturates instead of wrapping negative
fn sql_count(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn corrupt(entity: &'static str, id: Uuid, reason: impl fmt::Display) -> StoreError {
    StoreError::Corrupt {
        entity,
        id: id.to_string(),
        reason: reason.to_string(),
    }
}

impl TryFrom<RideRow> for Ride {
    type Error = StoreError;

    fn try_from(row: RideRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<RideStatus>()
            .map_err(|e| corrupt("ride", row.id, e))?;
        let seat_holds: Vec<SeatHold> =
            serde_json::from_value(row.seat_holds).map_err(|e| corrupt("ride", row.id, e))?;

        let held: i32 = seat_holds.iter().map(|h| h.seats).sum();
        if row.seats_available != row.total_seats - held {
            return Err(corrupt(
                "ride",
                row.id,
                format!(
                    "seats_available {} does not match {} total minus {} held",
                    row.seats_available, row.total_seats, held
                ),
            ));
        }

        Ok(Ride {
            id: row.id,
            driver_id: row.driver_id,
            origin: row.origin,
            destination: row.destination,
            description: row.description,
            departure_time: row.departure_time,
            total_seats: row.total_seats,
            seats_available: row.seats_available,
            price_cents: row.price_cents,
            status,
            passengers: row.passengers,
            seat_holds,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<BookingStatus>()
            .map_err(|e| corrupt("booking", row.id, e))?;
        if row.seats < 1 {
            return Err(corrupt("booking", row.id, format!("seat count {}", row.seats)));
        }
        Ok(Booking {
            id: row.id,
            ride_id: row.ride_id,
            passenger_id: row.passenger_id,
            seats: row.seats,
            status,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl TryFrom<RatingRow> for Rating {
    type Error = StoreError;

    fn try_from(row: RatingRow) -> Result<Self, Self::Error> {
        if !(1..=5).contains(&row.score) {
            return Err(corrupt("rating", row.id, format!("score {}", row.score)));
        }
        Ok(Rating {
            id: row.id,
            rater_id: row.rater_id,
            rated_id: row.rated_id,
            ride_id: row.ride_id,
            score: row.score,
            comment: row.comment,
            created_at: row.created_at,
        })
    }
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = row
            .role
            .parse::<UserRole>()
            .map_err(|e| corrupt("user", row.id, e))?;
        Ok(User {
            id: row.id,
            full_name: row.full_name,
            email: row.email,
            role,
            rides_offered: row.rides_offered,
            bookings: row.bookings,
            ratings_received: row.ratings_received,
            created_at: row.created_at,
        })
    }
}

fn convert_all<R, T>(rows: Vec<R>) -> StoreResult<Vec<T>>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

/// `%needle%` with LIKE metacharacters escaped
fn like_pattern(needle: &str) -> String {
    let escaped = needle
        .trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn index_column(index: UserIndex) -> &'static str {
    match index {
        UserIndex::RidesOffered => "rides_offered",
        UserIndex::Bookings => "bookings",
        UserIndex::RatingsReceived => "ratings_received",
    }
}

fn holds_json(ride: &Ride) -> StoreResult<serde_json::Value> {
    serde_json::to_value(&ride.seat_holds).map_err(|e| corrupt("ride", ride.id, e))
}

/// Distinguishes a missing row from a stale version after a zero-row update
async fn missed_update(
    conn: &mut PgConnection,
    table: &'static str,
    entity: &'static str,
    id: Uuid,
) -> StoreError {
    let sql = format!("SELECT version FROM {} WHERE id = $1", table);
    match sqlx::query_scalar::<_, i64>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
    {
        Ok(Some(_)) => StoreError::VersionConflict { entity, id },
        Ok(None) => StoreError::NotFound { entity, id },
        Err(e) => backend(e),
    }
}

async fn apply_write(conn: &mut PgConnection, write: Write) -> StoreResult<()> {
    match write {
        Write::InsertRide(ride) => {
            let holds = holds_json(&ride)?;
            let ride_id = ride.id;
            let parents = [ParentRef::new("rides_driver_id_fkey", "user", ride.driver_id)];
            sqlx::query(
                r#"
                INSERT INTO rides (id, driver_id, origin, destination, description, departure_time,
                    total_seats, seats_available, price_cents, status, passengers, seat_holds, version, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
                "#,
            )
            .bind(ride.id)
            .bind(ride.driver_id)
            .bind(ride.origin)
            .bind(ride.destination)
            .bind(ride.description)
            .bind(ride.departure_time)
            .bind(ride.total_seats)
            .bind(ride.seats_available)
            .bind(ride.price_cents)
            .bind(ride.status.as_str())
            .bind(ride.passengers)
            .bind(holds)
            .bind(ride.version)
            .bind(ride.created_at)
            .bind(ride.updated_at)
            .execute(&mut *conn)
            .await
            .map_err(|e| insert_failed("ride", ride_id, &parents, e))?;
        }
        Write::UpdateRide { ride, expected_version } => {
            let holds = holds_json(&ride)?;
            let id = ride.id;
            let result = sqlx::query(
                r#"
                UPDATE rides
                SET origin = $3, destination = $4, description = $5, departure_time = $6,
                    seats_available = $7, price_cents = $8, status = $9, passengers = $10,
                    seat_holds = $11, updated_at = $12, version = version + 1
                WHERE id = $1 AND version = $2
                "#,
            )
            .bind(id)
            .bind(expected_version)
            .bind(ride.origin)
            .bind(ride.destination)
            .bind(ride.description)
            .bind(ride.departure_time)
            .bind(ride.seats_available)
            .bind(ride.price_cents)
            .bind(ride.status.as_str())
            .bind(ride.passengers)
            .bind(holds)
            .bind(ride.updated_at)
            .execute(&mut *conn)
            .await
            .map_err(backend)?;

            if result.rows_affected() == 0 {
                return Err(missed_update(conn, "rides", "ride", id).await);
            }
        }
        Write::InsertBooking(booking) => {
            let parents = [
                ParentRef::new("bookings_ride_id_fkey", "ride", booking.ride_id),
                ParentRef::new("bookings_passenger_id_fkey", "user", booking.passenger_id),
            ];
            sqlx::query(
                r#"
                INSERT INTO bookings (id, ride_id, passenger_id, seats, status, version, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(booking.id)
            .bind(booking.ride_id)
            .bind(booking.passenger_id)
            .bind(booking.seats)
            .bind(booking.status.as_str())
            .bind(booking.version)
            .bind(booking.created_at)
            .bind(booking.updated_at)
            .execute(&mut *conn)
            .await
            .map_err(|e| insert_failed("booking", booking.id, &parents, e))?;
        }
        Write::UpdateBooking { booking, expected_version } => {
            let result = sqlx::query(
                r#"
                UPDATE bookings
                SET status = $3, updated_at = $4, version = version + 1
                WHERE id = $1 AND version = $2
                "#,
            )
            .bind(booking.id)
            .bind(expected_version)
            .bind(booking.status.as_str())
            .bind(booking.updated_at)
            .execute(&mut *conn)
            .await
            .map_err(backend)?;

            if result.rows_affected() == 0 {
                return Err(missed_update(conn, "bookings", "booking", booking.id).await);
            }
        }
        Write::DeleteBooking { id, expected_version } => {
            let result = sqlx::query("DELETE FROM bookings WHERE id = $1 AND version = $2")
                .bind(id)
                .bind(expected_version)
                .execute(&mut *conn)
                .await
                .map_err(backend)?;

            if result.rows_affected() == 0 {
                return Err(missed_update(conn, "bookings", "booking", id).await);
            }
        }
        Write::InsertRating(rating) => {
            let mut parents = vec![
                ParentRef::new("ratings_rated_id_fkey", "user", rating.rated_id),
                ParentRef::new("ratings_rater_id_fkey", "user", rating.rater_id),
            ];
            if let Some(ride_id) = rating.ride_id {
                parents.push(ParentRef::new("ratings_ride_id_fkey", "ride", ride_id));
            }
            sqlx::query(
                r#"
                INSERT INTO ratings (id, rater_id, rated_id, ride_id, score, comment, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(rating.id)
            .bind(rating.rater_id)
            .bind(rating.rated_id)
            .bind(rating.ride_id)
            .bind(rating.score)
            .bind(rating.comment)
            .bind(rating.created_at)
            .execute(&mut *conn)
            .await
            .map_err(|e| insert_failed("rating", rating.id, &parents, e))?;
        }
        Write::DeleteRating { id } => {
            let result = sqlx::query("DELETE FROM ratings WHERE id = $1")
                .bind(id)
                .execute(&mut *conn)
                .await
                .map_err(backend)?;

            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound { entity: "rating", id });
            }
        }
        Write::IndexPush { user_id, index, entry } => {
            let column = index_column(index);
            let sql = format!(
                "UPDATE users SET {col} = CASE WHEN $2 = ANY({col}) THEN {col} ELSE array_append({col}, $2) END WHERE id = $1",
                col = column
            );
            let result = sqlx::query(&sql)
                .bind(user_id)
                .bind(entry)
                .execute(&mut *conn)
                .await
                .map_err(backend)?;

            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound { entity: "user", id: user_id });
            }
        }
        Write::IndexPull { user_id, index, entry } => {
            let column = index_column(index);
            let sql = format!(
                "UPDATE users SET {col} = array_remove({col}, $2) WHERE id = $1",
                col = column
            );
            let result = sqlx::query(&sql)
                .bind(user_id)
                .bind(entry)
                .execute(&mut *conn)
                .await
                .map_err(backend)?;

            if result.rows_affected() == 0 {
                return Err(StoreError::NotFound { entity: "user", id: user_id });
            }
        }
    }
    Ok(())
}

#[async_trait]
impl RideRepository for PgGateway {
    async fn get_ride(&self, id: Uuid) -> StoreResult<Option<Ride>> {
        let sql = format!("SELECT {} FROM rides WHERE id = $1", RIDE_COLUMNS);
        let row = sqlx::query_as::<_, RideRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.map(Ride::try_from).transpose()
    }

    async fn search_rides(&self, query: &RideQuery) -> StoreResult<Vec<Ride>> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {} FROM rides WHERE status = ", RIDE_COLUMNS));
        qb.push_bind(RideStatus::Pending.as_str());

        if let Some(origin) = &query.origin {
            qb.push(" AND origin ILIKE ");
            qb.push_bind(like_pattern(origin));
        }
        if let Some(destination) = &query.destination {
            qb.push(" AND destination ILIKE ");
            qb.push_bind(like_pattern(destination));
        }
        if let Some(date) = query.date {
            qb.push(" AND (departure_time AT TIME ZONE 'UTC')::date >= ");
            qb.push_bind(date);
        }
        if let Some(min_seats) = query.min_seats {
            qb.push(" AND seats_available >= ");
            qb.push_bind(min_seats);
        }
        if let Some(max_price) = query.max_price_cents {
            qb.push(" AND price_cents <= ");
            qb.push_bind(max_price);
        }

        qb.push(" ORDER BY departure_time ASC, id ASC LIMIT ");
        qb.push_bind(sql_count(query.page.limit));
        qb.push(" OFFSET ");
        qb.push_bind(sql_count(query.page.skip));

        let rows = qb
            .build_query_as::<RideRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        debug!("Ride search returned {} rows", rows.len());
        convert_all(rows)
    }

    async fn list_rides_by_driver(
        &self,
        driver_id: Uuid,
        status: Option<RideStatus>,
        page: Page,
    ) -> StoreResult<Vec<Ride>> {
        let sql = format!(
            "SELECT {} FROM rides WHERE driver_id = $1 AND ($2::TEXT IS NULL OR status = $2) \
             ORDER BY created_at ASC, id ASC LIMIT $3 OFFSET $4",
            RIDE_COLUMNS
        );
        let rows = sqlx::query_as::<_, RideRow>(&sql)
            .bind(driver_id)
            .bind(status.map(|s| s.as_str()))
            .bind(sql_count(page.limit))
            .bind(sql_count(page.skip))
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        convert_all(rows)
    }

    async fn list_rides_to_destination(&self, destination: &str) -> StoreResult<Vec<Ride>> {
        let sql = format!(
            "SELECT {} FROM rides WHERE destination ILIKE $1 ORDER BY created_at ASC, id ASC",
            RIDE_COLUMNS
        );
        let rows = sqlx::query_as::<_, RideRow>(&sql)
            .bind(like_pattern(destination))
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        convert_all(rows)
    }
}

#[async_trait]
impl BookingRepository for PgGateway {
    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        let sql = format!("SELECT {} FROM bookings WHERE id = $1", BOOKING_COLUMNS);
        let row = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.map(Booking::try_from).transpose()
    }

    async fn list_bookings_by_passenger(
        &self,
        passenger_id: Uuid,
        status: Option<BookingStatus>,
        page: Page,
    ) -> StoreResult<Vec<Booking>> {
        let sql = format!(
            "SELECT {} FROM bookings WHERE passenger_id = $1 AND ($2::TEXT IS NULL OR status = $2) \
             ORDER BY created_at ASC, id ASC LIMIT $3 OFFSET $4",
            BOOKING_COLUMNS
        );
        let rows = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(passenger_id)
            .bind(status.map(|s| s.as_str()))
            .bind(sql_count(page.limit))
            .bind(sql_count(page.skip))
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        convert_all(rows)
    }

    async fn list_bookings_by_ride(
        &self,
        ride_id: Uuid,
        status: Option<BookingStatus>,
        page: Page,
    ) -> StoreResult<Vec<Booking>> {
        let sql = format!(
            "SELECT {} FROM bookings WHERE ride_id = $1 AND ($2::TEXT IS NULL OR status = $2) \
             ORDER BY created_at ASC, id ASC LIMIT $3 OFFSET $4",
            BOOKING_COLUMNS
        );
        let rows = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(ride_id)
            .bind(status.map(|s| s.as_str()))
            .bind(sql_count(page.limit))
            .bind(sql_count(page.skip))
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        convert_all(rows)
    }
}

#[async_trait]
impl RatingRepository for PgGateway {
    async fn get_rating(&self, id: Uuid) -> StoreResult<Option<Rating>> {
        let sql = format!("SELECT {} FROM ratings WHERE id = $1", RATING_COLUMNS);
        let row = sqlx::query_as::<_, RatingRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.map(Rating::try_from).transpose()
    }

    async fn list_ratings_received(&self, rated_id: Uuid, page: Page) -> StoreResult<Vec<Rating>> {
        let sql = format!(
            "SELECT {} FROM ratings WHERE rated_id = $1 ORDER BY created_at ASC, id ASC LIMIT $2 OFFSET $3",
            RATING_COLUMNS
        );
        let rows = sqlx::query_as::<_, RatingRow>(&sql)
            .bind(rated_id)
            .bind(sql_count(page.limit))
            .bind(sql_count(page.skip))
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        convert_all(rows)
    }

    async fn list_ratings_for_ride(&self, ride_id: Uuid) -> StoreResult<Vec<Rating>> {
        let sql = format!(
            "SELECT {} FROM ratings WHERE ride_id = $1 ORDER BY created_at ASC, id ASC",
            RATING_COLUMNS
        );
        let rows = sqlx::query_as::<_, RatingRow>(&sql)
            .bind(ride_id)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        convert_all(rows)
    }

    async fn aggregate_scores(&self, rated_id: Uuid) -> StoreResult<ScoreAggregate> {
        let (count, average): (i64, Option<f64>) = sqlx::query_as(
            "SELECT COUNT(*)::BIGINT, AVG(score)::FLOAT8 FROM ratings WHERE rated_id = $1",
        )
        .bind(rated_id)
        .fetch_one(&self.pool)
        .await
        .map_err(backend)?;
        Ok(ScoreAggregate { count, average })
    }
}

#[async_trait]
impl UserRepository for PgGateway {
    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.map(User::try_from).transpose()
    }

    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, full_name, email, role, rides_offered, bookings, ratings_received, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(user.id)
        .bind(&user.full_name)
        .bind(&user.email)
        .bind(user.role.as_str())
        .bind(&user.rides_offered)
        .bind(&user.bookings)
        .bind(&user.ratings_received)
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| insert_failed("user", &user.email, &[], e))?;
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for PgGateway {
    async fn commit(&self, tx: Transaction) -> StoreResult<()> {
        let mut db_tx = self.pool.begin().await.map_err(backend)?;

        for write in tx.into_writes() {
            if let Err(e) = apply_write(&mut db_tx, write).await {
                warn!("Rolling back transaction: {}", e);
                // Dropping the transaction also rolls back; explicit for the log ordering
                db_tx.rollback().await.map_err(backend)?;
                return Err(e);
            }
        }

        db_tx.commit().await.map_err(backend)?;
        Ok(())
    }
}
