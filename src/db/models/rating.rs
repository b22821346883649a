use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

pub const MIN_SCORE: u8 = 1;
pub const MAX_SCORE: u8 = 5;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, ToSchema)]
pub struct PropertyRating {
    pub id: Uuid,
    pub property_id: Uuid,
    pub booking_id: Uuid,
    pub reviewer_id: String,
    pub reviewer_name: String,
    pub score: u8,
    pub review: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, ToSchema)]
pub struct NewRating {
    pub score: u8,
    #[serde(default)]
    pub review: Option<String>,
}

impl NewRating {
    pub fn validate(&self) -> Vec<(&'static str, String)> {
        if (MIN_SCORE..=MAX_SCORE).contains(&self.score) {
            Vec::new()
        } else {
            vec![("score", format!("score must be between {MIN_SCORE} and {MAX_SCORE}"))]
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, ToSchema)]
pub struct RatingSummary {
    pub property_id: Uuid,
    pub average: f64,
    pub count: usize,
}

/// Mean score, or 0.0 for an unrated property.
pub fn average_score(ratings: &[PropertyRating]) -> f64 {
    if ratings.is_empty() {
        return 0.0;
    }
    let total: u32 = ratings.iter().map(|r| u32::from(r.score)).sum();
    f64::from(total) / ratings.len() as f64
}
