use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use unipool_core::repository::{RatingRepository, RideRepository, UnitOfWork};
use unipool_core::{Caller, CoreError, CoreResult, Gateway, Page, StoreError, Transaction, UserIndex};
use unipool_shared::Rating;

/// Mean score and rating count for one user
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatingSummary {
    pub user_id: Uuid,
    /// 0.0 when the user has no ratings yet
    pub average: f64,
    pub count: i64,
}

fn already_rated() -> CoreError {
    CoreError::InvalidRelationship("this user was already rated for this ride".to_string())
}

/// Peer ratings between drivers and the passengers they carried
pub struct RatingAggregator {
    gateway: Arc<dyn Gateway>,
}

impl RatingAggregator {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self { gateway }
    }

    /// Record a rating from the caller.
    ///
    /// Only a ride's driver and its accepted passengers may rate each other,
    /// once per pair and ride.
    pub async fn record(
        &self,
        caller: &Caller,
        rated_id: Uuid,
        ride_id: Uuid,
        score: i32,
        comment: Option<String>,
    ) -> CoreResult<Rating> {
        if !(1..=5).contains(&score) {
            return Err(CoreError::InvalidScore(score));
        }

        let ride = self
            .gateway
            .get_ride(ride_id)
            .await?
            .ok_or_else(|| CoreError::not_found("ride", ride_id))?;

        let rater_id = caller.user_id;
        if rater_id == rated_id {
            return Err(CoreError::InvalidRelationship(
                "users cannot rate themselves".to_string(),
            ));
        }

        let passenger_rates_driver = rated_id == ride.driver_id && ride.has_confirmed_passenger(rater_id);
        let driver_rates_passenger = rater_id == ride.driver_id && ride.has_confirmed_passenger(rated_id);
        if !passenger_rates_driver && !driver_rates_passenger {
            warn!("Rating on ride {} refused: {} and {} did not ride together", ride_id, rater_id, rated_id);
            return Err(CoreError::InvalidRelationship(
                "rater and rated user did not share this ride".to_string(),
            ));
        }

        let existing = self.gateway.list_ratings_for_ride(ride_id).await?;
        if existing
            .iter()
            .any(|r| r.rater_id == rater_id && r.rated_id == rated_id)
        {
            return Err(already_rated());
        }

        let rating = Rating::new(rater_id, rated_id, Some(ride_id), score, comment);

        let mut tx = Transaction::new();
        tx.insert_rating(rating.clone())
            .index_push(rated_id, UserIndex::RatingsReceived, rating.id);
        // A concurrent rating for the same pair can land after the check above
        self.gateway.commit(tx).await.map_err(|e| match e {
            StoreError::Duplicate { entity: "rating", .. } => already_rated(),
            other => other.into(),
        })?;

        info!("Rating {} recorded: {} rated {} with {}", rating.id, rater_id, rated_id, score);
        Ok(rating)
    }

    /// Mean of all scores the user has received, 0.0 when there are none
    pub async fn average_for(&self, user_id: Uuid) -> CoreResult<f64> {
        Ok(self.summary_for(user_id).await?.average)
    }

    pub async fn summary_for(&self, user_id: Uuid) -> CoreResult<RatingSummary> {
        let aggregate = self.gateway.aggregate_scores(user_id).await?;
        Ok(RatingSummary {
            user_id,
            average: aggregate.average.unwrap_or(0.0),
            count: aggregate.count,
        })
    }

    pub async fn get(&self, rating_id: Uuid) -> CoreResult<Rating> {
        self.gateway
            .get_rating(rating_id)
            .await?
            .ok_or_else(|| CoreError::not_found("rating", rating_id))
    }

    pub async fn list_received(&self, user_id: Uuid, page: Page) -> CoreResult<Vec<Rating>> {
        Ok(self.gateway.list_ratings_received(user_id, page).await?)
    }

    pub async fn list_for_ride(&self, ride_id: Uuid) -> CoreResult<Vec<Rating>> {
        Ok(self.gateway.list_ratings_for_ride(ride_id).await?)
    }

    /// Only the rater may withdraw a rating
    pub async fn delete(&self, rating_id: Uuid, caller: &Caller) -> CoreResult<()> {
        let rating = self.get(rating_id).await?;
        if rating.rater_id != caller.user_id {
            return Err(CoreError::Forbidden("only the rater can delete a rating".to_string()));
        }

        let mut tx = Transaction::new();
        tx.delete_rating(rating.id)
            .index_pull(rating.rated_id, UserIndex::RatingsReceived, rating.id);
        self.gateway.commit(tx).await?;

        info!("Rating {} deleted", rating.id);
        Ok(())
    }
}
