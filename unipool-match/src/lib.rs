pub mod scorer;
pub mod pickup;
pub mod patterns;

pub use scorer::{MatchQuality, MatchRequest, MatchWeights, RideMatcher, ScoreBreakdown, ScoredRide};
pub use pickup::{PickupRecommender, PickupSuggestion};
pub use patterns::{LocationFrequency, PatternAnalyzer, TimeFrequency, UserPatterns};
