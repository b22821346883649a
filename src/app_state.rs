use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::db::store::bookings::BookingStore;
use crate::middleware::auth::ProfileCache;
use crate::utils::analysis::PropertyAnalyzer;
use crate::utils::feed::PropertyFeed;
use crate::utils::pinning::PinningClient;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub bookings: BookingStore,
    pub feed: PropertyFeed,
    pub analyzer: Arc<PropertyAnalyzer>,
    pub pinning: Arc<PinningClient>,
    pub profiles: ProfileCache,
}
