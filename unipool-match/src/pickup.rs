use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use unipool_core::repository::RideRepository;
use unipool_core::{CoreError, CoreResult, Gateway};
use unipool_shared::Ride;

const MAX_SUGGESTIONS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickupSuggestion {
    pub origin: String,
    pub frequency: usize,
}

/// Most common origins among rides heading to a destination
pub fn rank_origins(rides: &[Ride]) -> Vec<PickupSuggestion> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for ride in rides {
        *counts.entry(ride.origin.trim()).or_insert(0) += 1;
    }

    let mut suggestions: Vec<PickupSuggestion> = counts
        .into_iter()
        .map(|(origin, frequency)| PickupSuggestion {
            origin: origin.to_string(),
            frequency,
        })
        .collect();
    suggestions.sort_by(|a, b| b.frequency.cmp(&a.frequency).then_with(|| a.origin.cmp(&b.origin)));
    suggestions.truncate(MAX_SUGGESTIONS);
    suggestions
}

pub struct PickupRecommender {
    gateway: Arc<dyn Gateway>,
}

impl PickupRecommender {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self { gateway }
    }

    pub async fn recommend(&self, destination: &str) -> CoreResult<Vec<PickupSuggestion>> {
        if destination.trim().is_empty() {
            return Err(CoreError::ValidationError("destination is required".to_string()));
        }

        // Completed and cancelled trips still say where people gather
        let rides = self.gateway.list_rides_to_destination(destination).await?;
        debug!("Ranking origins over {} rides to '{}'", rides.len(), destination.trim());

        Ok(rank_origins(&rides))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use unipool_shared::RideDraft;
    use uuid::Uuid;

    fn from(origin: &str) -> Ride {
        Ride::new(
            Uuid::new_v4(),
            RideDraft {
                origin: origin.to_string(),
                destination: "NUST H-12".to_string(),
                description: None,
                departure_time: Utc::now(),
                total_seats: 4,
                price_cents: 20000,
            },
        )
    }

    #[test]
    fn test_most_frequent_first_then_alphabetical() {
        let rides: Vec<Ride> = ["G-9", "F-10", "G-9", "Bahria", "F-10", "G-9", "I-8"]
            .into_iter()
            .map(from)
            .collect();

        let ranked = rank_origins(&rides);
        let origins: Vec<(&str, usize)> = ranked.iter().map(|s| (s.origin.as_str(), s.frequency)).collect();
        assert_eq!(origins, vec![("G-9", 3), ("F-10", 2), ("Bahria", 1), ("I-8", 1)]);
    }

    #[test]
    fn test_at_most_five_suggestions() {
        let rides: Vec<Ride> = ["A", "B", "C", "D", "E", "F", "G"].into_iter().map(from).collect();
        let ranked = rank_origins(&rides);
        assert_eq!(ranked.len(), 5);
        assert_eq!(ranked[0].origin, "A");
    }
}
