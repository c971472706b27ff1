pub mod aggregator;

pub use aggregator::{RatingAggregator, RatingSummary};
