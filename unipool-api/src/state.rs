use std::sync::Arc;
use tokio::sync::broadcast;

use unipool_booking::BookingManager;
use unipool_core::{Gateway, IdentityResolver};
use unipool_inventory::RideService;
use unipool_match::{PatternAnalyzer, PickupRecommender, RideMatcher};
use unipool_rating::RatingAggregator;
use unipool_shared::SeatEvent;
use unipool_store::{BookingRules, MatchingConfig};

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<dyn Gateway>,
    pub identity: Arc<dyn IdentityResolver>,
    pub rides: Arc<RideService>,
    pub bookings: Arc<BookingManager>,
    pub ratings: Arc<RatingAggregator>,
    pub matcher: Arc<RideMatcher>,
    pub pickups: Arc<PickupRecommender>,
    pub patterns: Arc<PatternAnalyzer>,
    pub sse_tx: broadcast::Sender<SeatEvent>,
}

impl AppState {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        identity: Arc<dyn IdentityResolver>,
        rules: BookingRules,
        matching: MatchingConfig,
    ) -> Self {
        // SSE fan-out; slow subscribers skip ahead
        let (sse_tx, _) = broadcast::channel(100);

        Self {
            rides: Arc::new(
                RideService::new(gateway.clone(), rules.clone()).with_events(sse_tx.clone()),
            ),
            bookings: Arc::new(
                BookingManager::new(gateway.clone(), rules).with_events(sse_tx.clone()),
            ),
            ratings: Arc::new(RatingAggregator::new(gateway.clone())),
            matcher: Arc::new(RideMatcher::new(gateway.clone(), matching)),
            pickups: Arc::new(PickupRecommender::new(gateway.clone())),
            patterns: Arc::new(PatternAnalyzer::new(gateway.clone())),
            gateway,
            identity,
            sse_tx,
        }
    }
}
