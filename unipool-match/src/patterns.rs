use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use unipool_core::repository::{BookingRepository, RideRepository, UserRepository};
use unipool_core::{Caller, CoreError, CoreResult, Gateway, Page};
use unipool_shared::{BookingStatus, Ride};

const TOP_ENTRIES: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationFrequency {
    pub location: String,
    pub frequency: usize,
}

/// Departure time of day, `HH:MM` in UTC
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeFrequency {
    pub time: String,
    pub frequency: usize,
}

/// Where and when a user travels, as driver and passenger combined
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPatterns {
    pub user_id: Uuid,
    pub top_origins: Vec<LocationFrequency>,
    pub top_destinations: Vec<LocationFrequency>,
    pub top_times: Vec<TimeFrequency>,
    pub total_rides: usize,
    pub driver_rides: usize,
    pub passenger_rides: usize,
}

/// Most frequent keys first, ties alphabetical
fn most_frequent(keys: impl Iterator<Item = String>) -> Vec<(String, usize)> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for key in keys {
        *counts.entry(key).or_insert(0) += 1;
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(TOP_ENTRIES);
    ranked
}

fn locations(ranked: Vec<(String, usize)>) -> Vec<LocationFrequency> {
    ranked
        .into_iter()
        .map(|(location, frequency)| LocationFrequency { location, frequency })
        .collect()
}

pub fn summarize(user_id: Uuid, driven: &[Ride], ridden: &[Ride]) -> UserPatterns {
    let all = || driven.iter().chain(ridden.iter());

    UserPatterns {
        user_id,
        top_origins: locations(most_frequent(all().map(|r| r.origin.trim().to_string()))),
        top_destinations: locations(most_frequent(all().map(|r| r.destination.trim().to_string()))),
        top_times: most_frequent(all().map(|r| r.departure_time.format("%H:%M").to_string()))
            .into_iter()
            .map(|(time, frequency)| TimeFrequency { time, frequency })
            .collect(),
        total_rides: driven.len() + ridden.len(),
        driver_rides: driven.len(),
        passenger_rides: ridden.len(),
    }
}

pub struct PatternAnalyzer {
    gateway: Arc<dyn Gateway>,
}

impl PatternAnalyzer {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self { gateway }
    }

    /// Travel history summary; users may only read their own
    pub async fn analyze(&self, user_id: Uuid, caller: &Caller) -> CoreResult<UserPatterns> {
        if user_id != caller.user_id {
            return Err(CoreError::Forbidden(
                "travel patterns are only shown to their owner".to_string(),
            ));
        }
        self.gateway
            .get_user(user_id)
            .await?
            .ok_or_else(|| CoreError::not_found("user", user_id))?;

        let driven = self
            .gateway
            .list_rides_by_driver(user_id, None, Page::unbounded())
            .await?;

        let bookings = self
            .gateway
            .list_bookings_by_passenger(user_id, None, Page::unbounded())
            .await?;
        let mut seen = HashSet::new();
        let mut ridden = Vec::new();
        for booking in bookings {
            if matches!(booking.status, BookingStatus::Rejected | BookingStatus::Cancelled) {
                continue;
            }
            if !seen.insert(booking.ride_id) {
                continue;
            }
            match self.gateway.get_ride(booking.ride_id).await? {
                Some(ride) => ridden.push(ride),
                None => warn!("Booking {} points at missing ride {}", booking.id, booking.ride_id),
            }
        }

        debug!(
            "Analyzing {} driven and {} ridden trips for {}",
            driven.len(),
            ridden.len(),
            user_id
        );
        Ok(summarize(user_id, &driven, &ridden))
    }
}
