use std::path::Path;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::db::models::booking::{BookingRequest, BookingStatus};
use crate::db::models::rating::{average_score, PropertyRating};
use crate::db::store::record_log::{Record, RecordLog, StoreError};

impl Record for BookingRequest {
    fn id(&self) -> Uuid {
        self.id
    }
}

impl Record for PropertyRating {
    fn id(&self) -> Uuid {
        self.id
    }
}

/// Bookings and ratings, each in its own record log.
#[derive(Clone)]
pub struct BookingStore {
    requests: RecordLog<BookingRequest>,
    ratings: RecordLog<PropertyRating>,
}

impl BookingStore {
    pub async fn open(
        bookings_path: impl AsRef<Path>,
        ratings_path: impl AsRef<Path>,
    ) -> Result<Self, StoreError> {
        Ok(Self {
            requests: RecordLog::open(bookings_path).await?,
            ratings: RecordLog::open(ratings_path).await?,
        })
    }

    pub async fn add_booking_request(
        &self,
        request: BookingRequest,
    ) -> Result<BookingRequest, StoreError> {
        let stored = self.requests.append(request).await?;
        info!(
            "Booking request {} for property {} from {}",
            stored.id, stored.property_id, stored.tenant_id
        );
        Ok(stored)
    }

    /// Every request, newest first.
    pub async fn list_requests(&self) -> Result<Vec<BookingRequest>, StoreError> {
        Ok(newest_first(self.requests.list().await?))
    }

    pub async fn get_request(&self, id: Uuid) -> Result<Option<BookingRequest>, StoreError> {
        self.requests.get(id).await
    }

    pub async fn get_requests_by_owner(
        &self,
        owner_id: &str,
    ) -> Result<Vec<BookingRequest>, StoreError> {
        let owner_id = owner_id.to_string();
        let found = self.requests.list_by(move |r| r.owner_id == owner_id).await?;
        Ok(newest_first(found))
    }

    pub async fn get_requests_by_tenant(
        &self,
        tenant_id: &str,
    ) -> Result<Vec<BookingRequest>, StoreError> {
        let tenant_id = tenant_id.to_string();
        let found = self.requests.list_by(move |r| r.tenant_id == tenant_id).await?;
        Ok(newest_first(found))
    }

    pub async fn get_requests_by_property(
        &self,
        property_id: Uuid,
    ) -> Result<Vec<BookingRequest>, StoreError> {
        let found = self
            .requests
            .list_by(move |r| r.property_id == property_id)
            .await?;
        Ok(newest_first(found))
    }

    /// Moves a pending request to approved/rejected; other fields are untouched.
    pub async fn update_request_status(
        &self,
        id: Uuid,
        status: BookingStatus,
    ) -> Result<BookingRequest, StoreError> {
        let updated = self
            .requests
            .update(id, move |request| {
                if !request.status.can_transition_to(status) {
                    return Err(StoreError::InvalidTransition {
                        from: request.status.as_str(),
                        to: status.as_str(),
                    });
                }
                request.status = status;
                request.updated_at = Some(Utc::now());
                Ok(())
            })
            .await?;
        info!("Booking request {} is now {}", id, status.as_str());
        Ok(updated)
    }

    /// Stores `rating`, overwriting any earlier rating for the same booking.
    /// An overwrite keeps the original rating id.
    pub async fn add_rating(&self, rating: PropertyRating) -> Result<PropertyRating, StoreError> {
        let booking_id = rating.booking_id;
        self.ratings
            .upsert_by(
                move |existing| existing.booking_id == booking_id,
                move |existing| match existing {
                    Some(previous) => PropertyRating {
                        id: previous.id,
                        ..rating
                    },
                    None => rating,
                },
            )
            .await
    }

    pub async fn get_rating_for_booking(
        &self,
        booking_id: Uuid,
    ) -> Result<Option<PropertyRating>, StoreError> {
        Ok(self
            .ratings
            .list_by(move |r| r.booking_id == booking_id)
            .await?
            .into_iter()
            .next())
    }

    pub async fn get_ratings_for_property(
        &self,
        property_id: Uuid,
    ) -> Result<Vec<PropertyRating>, StoreError> {
        self.ratings
            .list_by(move |r| r.property_id == property_id)
            .await
    }

    /// Average score for a property; 0.0 when nobody has rated it yet.
    pub async fn get_property_rating(&self, property_id: Uuid) -> Result<f64, StoreError> {
        Ok(average_score(&self.get_ratings_for_property(property_id).await?))
    }
}

fn newest_first(mut requests: Vec<BookingRequest>) -> Vec<BookingRequest> {
    requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    requests
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::store::record_log::tests::scratch_path;
    use chrono::{Duration, NaiveDate};

    async fn store() -> BookingStore {
        let dir = scratch_path("unused");
        let dir = dir.parent().unwrap();
        BookingStore::open(dir.join("bookings.jsonl"), dir.join("ratings.jsonl"))
            .await
            .unwrap()
    }

    fn request(owner: &str, tenant: &str, property_id: Uuid) -> BookingRequest {
        BookingRequest {
            id: Uuid::new_v4(),
            property_id,
            property_name: "Lakeview PG".to_string(),
            property_image: Some("https://gateway.pinata.cloud/ipfs/QmLake".to_string()),
            owner_id: owner.to_string(),
            owner_name: "Meera".to_string(),
            tenant_id: tenant.to_string(),
            tenant_name: "Kabir".to_string(),
            tenant_email: "kabir@example.com".to_string(),
            tenant_phone: "9000000000".to_string(),
            move_in_date: NaiveDate::from_ymd_opt(2026, 12, 1).unwrap(),
            duration_months: 6,
            message: "Is parking available?".to_string(),
            status: BookingStatus::Pending,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    fn rating(property_id: Uuid, booking_id: Uuid, score: u8) -> PropertyRating {
        PropertyRating {
            id: Uuid::new_v4(),
            property_id,
            booking_id,
            reviewer_id: "tenant-1".to_string(),
            reviewer_name: "Kabir".to_string(),
            score,
            review: format!("{score} stars"),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn approved_request_shows_up_for_owner_unchanged_otherwise() {
        let store = store().await;
        let original = store
            .add_booking_request(request("owner-1", "tenant-1", Uuid::new_v4()))
            .await
            .unwrap();

        store
            .update_request_status(original.id, BookingStatus::Approved)
            .await
            .unwrap();

        let owned = store.get_requests_by_owner("owner-1").await.unwrap();
        assert_eq!(owned.len(), 1);
        let updated = &owned[0];
        assert_eq!(updated.status, BookingStatus::Approved);
        assert!(updated.updated_at.is_some());
        assert_eq!(
            BookingRequest {
                status: BookingStatus::Pending,
                updated_at: None,
                ..updated.clone()
            },
            original
        );
    }

    #[tokio::test]
    async fn decided_requests_cannot_change_again() {
        let store = store().await;
        let r = store
            .add_booking_request(request("owner-1", "tenant-1", Uuid::new_v4()))
            .await
            .unwrap();
        store
            .update_request_status(r.id, BookingStatus::Rejected)
            .await
            .unwrap();

        let again = store.update_request_status(r.id, BookingStatus::Approved).await;
        assert!(matches!(
            again,
            Err(StoreError::InvalidTransition { from: "rejected", to: "approved" })
        ));
        let stored = store.get_request(r.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Rejected);
    }

    #[tokio::test]
    async fn requests_are_partitioned_by_owner_tenant_and_property() {
        let store = store().await;
        let lake = Uuid::new_v4();
        let hill = Uuid::new_v4();
        let mut older = request("owner-1", "tenant-1", lake);
        older.created_at = Utc::now() - Duration::days(1);
        store.add_booking_request(older.clone()).await.unwrap();
        let newer = store
            .add_booking_request(request("owner-1", "tenant-2", lake))
            .await
            .unwrap();
        store
            .add_booking_request(request("owner-2", "tenant-1", hill))
            .await
            .unwrap();

        let by_owner = store.get_requests_by_owner("owner-1").await.unwrap();
        assert_eq!(
            by_owner.iter().map(|r| r.id).collect::<Vec<_>>(),
            vec![newer.id, older.id]
        );
        assert_eq!(store.get_requests_by_tenant("tenant-1").await.unwrap().len(), 2);
        assert_eq!(store.get_requests_by_property(hill).await.unwrap().len(), 1);
        assert_eq!(store.list_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn second_rating_for_a_booking_overwrites_the_first() {
        let store = store().await;
        let property = Uuid::new_v4();
        let booking = Uuid::new_v4();

        let first = store.add_rating(rating(property, booking, 2)).await.unwrap();
        let second = store.add_rating(rating(property, booking, 5)).await.unwrap();

        assert_eq!(second.id, first.id);
        let ratings = store.get_ratings_for_property(property).await.unwrap();
        assert_eq!(ratings.len(), 1);
        assert_eq!(ratings[0].score, 5);
        assert_eq!(
            store.get_rating_for_booking(booking).await.unwrap().map(|r| r.score),
            Some(5)
        );
    }

    #[tokio::test]
    async fn property_rating_is_mean_or_zero() {
        let store = store().await;
        let property = Uuid::new_v4();
        assert_eq!(store.get_property_rating(property).await.unwrap(), 0.0);

        store.add_rating(rating(property, Uuid::new_v4(), 3)).await.unwrap();
        store.add_rating(rating(property, Uuid::new_v4(), 5)).await.unwrap();
        store.add_rating(rating(Uuid::new_v4(), Uuid::new_v4(), 1)).await.unwrap();

        assert_eq!(store.get_property_rating(property).await.unwrap(), 4.0);
    }

    #[tokio::test]
    async fn simultaneous_requests_on_the_same_snapshot_are_both_kept() {
        let store = store().await;
        let property = Uuid::new_v4();
        let (a, b) = tokio::join!(
            store.add_booking_request(request("owner-1", "tenant-1", property)),
            store.add_booking_request(request("owner-1", "tenant-2", property)),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        let ids: Vec<Uuid> = store
            .get_requests_by_property(property)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&a.id) && ids.contains(&b.id));
    }
}
