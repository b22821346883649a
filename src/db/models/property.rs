// src/db/models/property.rs
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type, ToSchema)]
#[sqlx(type_name = "property_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    Apartment,
    House,
    Villa,
    Pg,
    Studio,
    Commercial,
}

impl FromStr for PropertyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "apartment" => Ok(PropertyType::Apartment),
            "house" => Ok(PropertyType::House),
            "villa" => Ok(PropertyType::Villa),
            "pg" => Ok(PropertyType::Pg),
            "studio" => Ok(PropertyType::Studio),
            "commercial" => Ok(PropertyType::Commercial),
            other => Err(format!("unknown property type `{other}`")),
        }
    }
}

/// Lifecycle of a listing: pending_verification -> approved | rejected
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, sqlx::Type, ToSchema)]
#[sqlx(type_name = "property_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PropertyStatus {
    PendingVerification,
    Approved,
    Rejected,
}

impl PropertyStatus {
    pub fn can_transition_to(self, next: PropertyStatus) -> bool {
        matches!(
            (self, next),
            (PropertyStatus::PendingVerification, PropertyStatus::Approved)
                | (PropertyStatus::PendingVerification, PropertyStatus::Rejected)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PropertyStatus::PendingVerification => "pending_verification",
            PropertyStatus::Approved => "approved",
            PropertyStatus::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, FromRow, ToSchema)]
pub struct Property {
    pub id: Uuid,
    pub name: String,
    pub property_type: PropertyType,
    pub description: String,
    pub rent: i64,
    pub bedrooms: i32,
    pub bathrooms: i32,
    pub area_sqft: i32,
    pub state: String,
    pub city: String,
    pub locality: String,
    pub address: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub owner_id: String,
    pub owner_name: String,
    pub owner_email: String,
    pub images: Vec<String>,
    pub status: PropertyStatus,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Property {
    pub fn is_approved(&self) -> bool {
        self.status == PropertyStatus::Approved
    }

    pub fn cover_image(&self) -> Option<&str> {
        self.images.first().map(String::as_str)
    }
}

/// ✅ **Property Submission (Owner Sends This)**
#[derive(Debug, Serialize, Deserialize, Clone, ToSchema)]
pub struct NewProperty {
    pub name: String,
    pub property_type: PropertyType,
    pub description: String,
    pub rent: i64,
    pub bedrooms: i32,
    pub bathrooms: i32,
    pub area_sqft: i32,
    pub state: String,
    pub city: String,
    pub locality: String,
    pub address: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Gateway URLs returned by `/uploads/images`
    pub images: Vec<String>,
}

impl NewProperty {
    /// Returns one message per invalid field; empty means the submission is complete.
    pub fn validate(&self) -> Vec<(&'static str, String)> {
        let mut errors = Vec::new();

        let required = [
            ("name", &self.name),
            ("description", &self.description),
            ("state", &self.state),
            ("city", &self.city),
            ("locality", &self.locality),
            ("address", &self.address),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                errors.push((field, format!("{field} is required")));
            }
        }

        if self.rent <= 0 {
            errors.push(("rent", "rent must be greater than zero".to_string()));
        }
        if self.bedrooms < 0 {
            errors.push(("bedrooms", "bedrooms cannot be negative".to_string()));
        }
        if self.bathrooms < 0 {
            errors.push(("bathrooms", "bathrooms cannot be negative".to_string()));
        }
        if self.area_sqft <= 0 {
            errors.push(("area_sqft", "area must be greater than zero".to_string()));
        }
        if self.images.iter().all(|url| url.trim().is_empty()) {
            errors.push(("images", "at least one image is required".to_string()));
        }
        if let Some(lat) = self.latitude {
            if !(-90.0..=90.0).contains(&lat) {
                errors.push(("latitude", "latitude must be between -90 and 90".to_string()));
            }
        }
        if let Some(lng) = self.longitude {
            if !(-180.0..=180.0).contains(&lng) {
                errors.push(("longitude", "longitude must be between -180 and 180".to_string()));
            }
        }

        errors
    }
}

/// Admin decision on a pending listing
#[derive(Debug, Serialize, Deserialize, Clone, ToSchema)]
pub struct PropertyStatusUpdate {
    pub status: PropertyStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission() -> NewProperty {
        NewProperty {
            name: "Sunny 2BHK".to_string(),
            property_type: PropertyType::Apartment,
            description: "Close to the metro".to_string(),
            rent: 25_000,
            bedrooms: 2,
            bathrooms: 2,
            area_sqft: 950,
            state: "Karnataka".to_string(),
            city: "Bengaluru".to_string(),
            locality: "Koramangala".to_string(),
            address: "5th Block, Koramangala".to_string(),
            latitude: Some(12.93),
            longitude: Some(77.62),
            images: vec!["https://gateway.pinata.cloud/ipfs/QmCover".to_string()],
        }
    }

    #[test]
    fn complete_submission_has_no_errors() {
        assert!(submission().validate().is_empty());
    }

    #[test]
    fn missing_fields_are_reported_per_field() {
        let mut new = submission();
        new.name = "  ".to_string();
        new.rent = 0;
        new.images.clear();
        new.latitude = Some(123.0);

        let fields: Vec<&str> = new.validate().into_iter().map(|(f, _)| f).collect();
        assert_eq!(fields, vec!["name", "rent", "images", "latitude"]);
    }

    #[test]
    fn only_pending_listings_can_be_decided() {
        use PropertyStatus::*;
        assert!(PendingVerification.can_transition_to(Approved));
        assert!(PendingVerification.can_transition_to(Rejected));
        assert!(!Approved.can_transition_to(Rejected));
        assert!(!Rejected.can_transition_to(Approved));
        assert!(!Approved.can_transition_to(PendingVerification));
    }

    #[test]
    fn statuses_serialize_as_snake_case() {
        assert_eq!(
            serde_json::to_value(PropertyStatus::PendingVerification).unwrap(),
            serde_json::json!("pending_verification")
        );
        assert_eq!(serde_json::to_value(PropertyType::Pg).unwrap(), serde_json::json!("pg"));
    }
}
