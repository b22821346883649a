// src/db/models/booking.rs
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::models::property::Property;

pub const MAX_DURATION_MONTHS: u32 = 36;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Approved,
    Rejected,
}

impl BookingStatus {
    /// pending -> approved | rejected, nothing else
    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        self == BookingStatus::Pending && next != BookingStatus::Pending
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Approved => "approved",
            BookingStatus::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, ToSchema)]
pub struct BookingRequest {
    pub id: Uuid,
    pub property_id: Uuid,
    pub property_name: String,
    pub property_image: Option<String>,
    pub owner_id: String,
    pub owner_name: String,
    pub tenant_id: String,
    pub tenant_name: String,
    pub tenant_email: String,
    pub tenant_phone: String,
    pub move_in_date: NaiveDate,
    pub duration_months: u32,
    pub message: String,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl BookingRequest {
    /// Builds a pending request, copying the listing's display fields onto it.
    pub fn new(submission: NewBookingRequest, property: &Property, tenant_id: &str) -> Self {
        BookingRequest {
            id: Uuid::new_v4(),
            property_id: property.id,
            property_name: property.name.clone(),
            property_image: property.cover_image().map(str::to_string),
            owner_id: property.owner_id.clone(),
            owner_name: property.owner_name.clone(),
            tenant_id: tenant_id.to_string(),
            tenant_name: submission.tenant_name.trim().to_string(),
            tenant_email: submission.tenant_email.trim().to_string(),
            tenant_phone: submission.tenant_phone.trim().to_string(),
            move_in_date: submission.move_in_date,
            duration_months: submission.duration_months,
            message: submission.message.unwrap_or_default(),
            status: BookingStatus::Pending,
            created_at: Utc::now(),
            updated_at: None,
        }
    }
}

/// ✅ **Booking Form (Tenant Sends This)**
#[derive(Debug, Serialize, Deserialize, Clone, ToSchema)]
pub struct NewBookingRequest {
    pub property_id: Uuid,
    pub tenant_name: String,
    pub tenant_email: String,
    pub tenant_phone: String,
    pub move_in_date: NaiveDate,
    pub duration_months: u32,
    #[serde(default)]
    pub message: Option<String>,
}

impl NewBookingRequest {
    pub fn validate(&self, today: NaiveDate) -> Vec<(&'static str, String)> {
        let mut errors = Vec::new();

        if self.tenant_name.trim().is_empty() {
            errors.push(("tenant_name", "name is required".to_string()));
        }
        let email = self.tenant_email.trim();
        if email.is_empty() || !email.contains('@') {
            errors.push(("tenant_email", "a valid email is required".to_string()));
        }
        if self.tenant_phone.trim().is_empty() {
            errors.push(("tenant_phone", "phone is required".to_string()));
        }
        if self.move_in_date < today {
            errors.push(("move_in_date", "move-in date cannot be in the past".to_string()));
        }
        if self.duration_months == 0 || self.duration_months > MAX_DURATION_MONTHS {
            errors.push((
                "duration_months",
                format!("duration must be between 1 and {MAX_DURATION_MONTHS} months"),
            ));
        }

        errors
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, ToSchema)]
pub struct BookingStatusUpdate {
    pub status: BookingStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(move_in: NaiveDate) -> NewBookingRequest {
        NewBookingRequest {
            property_id: Uuid::new_v4(),
            tenant_name: "Arjun".to_string(),
            tenant_email: "arjun@example.com".to_string(),
            tenant_phone: "+91 98450 00000".to_string(),
            move_in_date: move_in,
            duration_months: 11,
            message: None,
        }
    }

    #[test]
    fn booking_transitions_only_leave_pending() {
        use BookingStatus::*;
        assert!(Pending.can_transition_to(Approved));
        assert!(Pending.can_transition_to(Rejected));
        assert!(!Pending.can_transition_to(Pending));
        assert!(!Approved.can_transition_to(Rejected));
        assert!(!Rejected.can_transition_to(Approved));
    }

    #[test]
    fn past_move_in_and_bad_duration_are_rejected() {
        let today = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        let mut booking = form(NaiveDate::from_ymd_opt(2026, 10, 1).unwrap());
        booking.duration_months = 0;
        booking.tenant_email = "not-an-email".to_string();

        let fields: Vec<&str> = booking.validate(today).into_iter().map(|(f, _)| f).collect();
        assert_eq!(fields, vec!["tenant_email", "move_in_date", "duration_months"]);
    }

    #[test]
    fn move_in_today_is_allowed() {
        let today = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        assert!(form(today).validate(today).is_empty());
    }
}
