use serde::{Deserialize, Serialize};
use chrono::NaiveDate;
use unipool_shared::{Ride, RideStatus};

/// Offset pagination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub skip: usize,
    pub limit: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self { skip: 0, limit: 100 }
    }
}

impl Page {
    pub fn new(skip: usize, limit: usize) -> Self {
        Self { skip, limit }
    }

    /// Caps the limit at `max`
    pub fn clamped(self, max: usize) -> Self {
        Self { skip: self.skip, limit: self.limit.min(max) }
    }

    /// Everything from the start, for cascades that must see every record
    pub fn unbounded() -> Self {
        Self { skip: 0, limit: u32::MAX as usize }
    }
}

/// Candidate filter for ride search.
///
/// Text fields match as case-insensitive substrings; `date` keeps rides
/// departing on or after the start of that day.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RideQuery {
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub date: Option<NaiveDate>,
    pub min_seats: Option<i32>,
    pub max_price_cents: Option<i32>,
    #[serde(default)]
    pub page: Page,
}

impl RideQuery {
    /// In-process evaluation of the filter, for gateways without a query engine
    pub fn matches(&self, ride: &Ride) -> bool {
        if ride.status != RideStatus::Pending {
            return false;
        }
        if let Some(origin) = &self.origin {
            if !contains_ignore_case(&ride.origin, origin) {
                return false;
            }
        }
        if let Some(destination) = &self.destination {
            if !contains_ignore_case(&ride.destination, destination) {
                return false;
            }
        }
        if let Some(date) = self.date {
            if ride.departure_time.date_naive() < date {
                return false;
            }
        }
        if let Some(min_seats) = self.min_seats {
            if ride.seats_available < min_seats {
                return false;
            }
        }
        if let Some(max_price) = self.max_price_cents {
            if ride.price_cents > max_price {
                return false;
            }
        }
        true
    }
}

pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.trim().to_lowercase())
}
