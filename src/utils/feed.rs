//! Live property snapshots.
//!
//! Writers publish the whole collection after every change; readers always
//! see the most recent snapshot (latest-snapshot-wins) and can wait for one
//! newer than the version they already hold.

use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use sqlx::PgPool;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error};
use utoipa::ToSchema;

use crate::db::models::property::Property;
use crate::db::queries::property::list_properties;

#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub version: u64,
    pub properties: Arc<Vec<Property>>,
}

/// Wire shape of a snapshot delivery.
#[derive(Debug, Serialize, ToSchema)]
pub struct SnapshotView {
    pub version: u64,
    pub properties: Vec<Property>,
}

#[derive(Clone)]
pub struct PropertyFeed {
    tx: Arc<watch::Sender<Snapshot>>,
    // held from load to publish so refreshes land in the order they loaded
    refresh_lock: Arc<Mutex<()>>,
}

impl Default for PropertyFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl PropertyFeed {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Snapshot::default());
        Self {
            tx: Arc::new(tx),
            refresh_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn current(&self) -> Snapshot {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.tx.subscribe()
    }

    /// Replaces the snapshot and bumps the version.
    pub fn publish(&self, properties: Vec<Property>) -> u64 {
        let properties = Arc::new(properties);
        let mut version = 0;
        self.tx.send_modify(|snapshot| {
            snapshot.version += 1;
            snapshot.properties = properties;
            version = snapshot.version;
        });
        debug!("Published property snapshot v{}", version);
        version
    }

    /// Re-materializes the collection from the database and publishes it.
    /// On failure the previous snapshot stays in place.
    pub async fn refresh(&self, pool: &PgPool) -> Result<u64, sqlx::Error> {
        self.refresh_with(|| list_properties(pool)).await
    }

    /// Loads and publishes under one lock, so a slow load that started
    /// earlier can never overwrite a snapshot loaded after it.
    pub async fn refresh_with<F, Fut, E>(&self, load: F) -> Result<u64, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<Property>, E>>,
        E: Debug,
    {
        let _guard = self.refresh_lock.lock().await;
        match load().await {
            Ok(properties) => Ok(self.publish(properties)),
            Err(e) => {
                error!("Failed to refresh property feed: {:?}", e);
                Err(e)
            }
        }
    }

    /// First snapshot newer than `since`, or the current one once `wait` elapses.
    ///
    /// A `since` ahead of the current version comes from before a restart,
    /// so it gets the current snapshot straight away.
    pub async fn wait_newer(&self, since: u64, wait: Duration) -> Snapshot {
        let current = self.current();
        if since > current.version {
            return current;
        }

        let mut rx = self.subscribe();
        let newer = async {
            loop {
                {
                    let snapshot = rx.borrow_and_update();
                    if snapshot.version > since {
                        return snapshot.clone();
                    }
                }
                if rx.changed().await.is_err() {
                    return rx.borrow().clone();
                }
            }
        };
        match tokio::time::timeout(wait, newer).await {
            Ok(snapshot) => snapshot,
            Err(_) => self.current(),
        }
    }
}
