use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use unipool_core::repository::RideRepository;
use unipool_core::{Caller, CoreError, CoreResult, Gateway, RideQuery};
use unipool_rating::RatingAggregator;
use unipool_shared::Ride;
use unipool_store::app_config::MatchingConfig;

/// Upper bound on candidates pulled from the gateway per match request
const MAX_CANDIDATES: usize = 100;

/// Relative importance of each signal. Need not sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchWeights {
    pub w_rating: f64,
    pub w_price: f64,
    pub w_proximity: f64,
}

impl MatchWeights {
    pub fn new(w_rating: f64, w_price: f64, w_proximity: f64) -> Self {
        Self { w_rating, w_price, w_proximity }
    }

    fn validate(&self) -> CoreResult<()> {
        for (name, w) in [
            ("w_rating", self.w_rating),
            ("w_price", self.w_price),
            ("w_proximity", self.w_proximity),
        ] {
            if !w.is_finite() || w < 0.0 {
                return Err(CoreError::ValidationError(format!(
                    "{} must be a non-negative number, got {}",
                    name, w
                )));
            }
        }
        Ok(())
    }
}

impl From<&MatchingConfig> for MatchWeights {
    fn from(config: &MatchingConfig) -> Self {
        Self::new(config.w_rating, config.w_price, config.w_proximity)
    }
}

/// Per-signal components, each in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub rating: f64,
    pub price: f64,
    pub proximity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchQuality {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl MatchQuality {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            MatchQuality::Excellent
        } else if score >= 0.6 {
            MatchQuality::Good
        } else if score >= 0.4 {
            MatchQuality::Fair
        } else {
            MatchQuality::Poor
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredRide {
    pub ride: Ride,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
    pub quality: MatchQuality,
}

/// What a rider is looking for
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchRequest {
    #[serde(default)]
    pub query: RideQuery,
    pub preferred_departure: Option<DateTime<Utc>>,
    /// Overrides the configured weights
    pub weights: Option<MatchWeights>,
}

/// Rating component for drivers nobody has rated yet. Mid-scale, so a new
/// driver neither beats a well-rated one nor sinks below a poorly-rated one.
pub const UNRATED_COMPONENT: f64 = 0.5;

/// `None` means the driver has no ratings
pub fn rating_component(average: Option<f64>) -> f64 {
    match average {
        Some(average) => (average / 5.0).clamp(0.0, 1.0),
        None => UNRATED_COMPONENT,
    }
}

/// Cheaper is better, relative to the most expensive candidate in the pool
pub fn price_component(price_cents: i32, max_price_cents: i32) -> f64 {
    if max_price_cents <= 0 {
        return 0.0;
    }
    (1.0 - price_cents as f64 / max_price_cents as f64).clamp(0.0, 1.0)
}

/// Linear decay from 1 at the preferred time to 0 at the window edge
pub fn proximity_component(
    departure: DateTime<Utc>,
    preferred: Option<DateTime<Utc>>,
    window: Duration,
) -> f64 {
    let Some(preferred) = preferred else {
        return 0.0;
    };
    let window_ms = window.num_milliseconds();
    if window_ms <= 0 {
        return 0.0;
    }
    let delta_ms = (departure - preferred).num_milliseconds().abs();
    if delta_ms > window_ms {
        return 0.0;
    }
    1.0 - delta_ms as f64 / window_ms as f64
}

/// Score and rank candidates.
///
/// `driver_averages` maps rated drivers to their mean rating; drivers
/// missing from it are unrated and get `UNRATED_COMPONENT`. Sorted by score
/// descending, ties by ride id ascending.
pub fn score_candidates(
    candidates: Vec<Ride>,
    driver_averages: &HashMap<Uuid, f64>,
    preferred: Option<DateTime<Utc>>,
    weights: MatchWeights,
    window: Duration,
) -> Vec<ScoredRide> {
    let max_price = candidates.iter().map(|r| r.price_cents).max().unwrap_or(0);

    let mut scored: Vec<ScoredRide> = candidates
        .into_iter()
        .map(|ride| {
            let average = driver_averages.get(&ride.driver_id).copied();
            let breakdown = ScoreBreakdown {
                rating: rating_component(average),
                price: price_component(ride.price_cents, max_price),
                proximity: proximity_component(ride.departure_time, preferred, window),
            };
            let score = weights.w_rating * breakdown.rating
                + weights.w_price * breakdown.price
                + weights.w_proximity * breakdown.proximity;
            ScoredRide {
                ride,
                score,
                breakdown,
                quality: MatchQuality::from_score(score),
            }
        })
        .collect();

    scored.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.ride.id.cmp(&b.ride.id)));
    scored
}

/// Ranks candidate rides for a rider
pub struct RideMatcher {
    gateway: Arc<dyn Gateway>,
    ratings: RatingAggregator,
    config: MatchingConfig,
}

impl RideMatcher {
    pub fn new(gateway: Arc<dyn Gateway>, config: MatchingConfig) -> Self {
        Self {
            ratings: RatingAggregator::new(gateway.clone()),
            gateway,
            config,
        }
    }

    pub async fn find_matches(&self, caller: &Caller, request: &MatchRequest) -> CoreResult<Vec<ScoredRide>> {
        let weights = request
            .weights
            .unwrap_or_else(|| MatchWeights::from(&self.config));
        weights.validate()?;
        let window = Duration::try_minutes(self.config.proximity_window_minutes)
            .filter(|w| *w > Duration::zero())
            .ok_or_else(|| {
                CoreError::ValidationError(format!(
                    "proximity window of {} minutes is out of range",
                    self.config.proximity_window_minutes
                ))
            })?;

        let mut query = request.query.clone();
        query.page = query.page.clamped(MAX_CANDIDATES);

        let candidates: Vec<Ride> = self
            .gateway
            .search_rides(&query)
            .await?
            .into_iter()
            .filter(|ride| ride.driver_id != caller.user_id)
            .collect();

        let mut looked_up = HashSet::new();
        let mut driver_averages = HashMap::new();
        for ride in &candidates {
            if looked_up.insert(ride.driver_id) {
                let summary = self.ratings.summary_for(ride.driver_id).await?;
                if summary.count > 0 {
                    driver_averages.insert(ride.driver_id, summary.average);
                }
            }
        }

        let mut ranked = score_candidates(
            candidates,
            &driver_averages,
            request.preferred_departure,
            weights,
            window,
        );
        debug!(
            "Scored {} candidates across {} drivers ({} rated)",
            ranked.len(),
            looked_up.len(),
            driver_averages.len()
        );

        ranked.truncate(self.config.max_results);
        Ok(ranked)
    }
}
