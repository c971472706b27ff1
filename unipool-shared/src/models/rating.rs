use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

/// A score one ride participant gave another. Immutable once stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rating {
    pub id: Uuid,
    pub rater_id: Uuid,
    pub rated_id: Uuid,
    pub ride_id: Option<Uuid>,
    pub score: i32,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Rating {
    pub fn new(
        rater_id: Uuid,
        rated_id: Uuid,
        ride_id: Option<Uuid>,
        score: i32,
        comment: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            rater_id,
            rated_id,
            ride_id,
            score,
            comment,
            created_at: Utc::now(),
        }
    }
}
