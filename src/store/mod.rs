//! Event Store
//!
//! Typed data-access surface consumed by search and recommendation. The
//! persistence layer owns the data; this crate only reads it. Two backends
//! implement the same contract:
//!
//! - [`MemoryStore`]: lock-guarded maps, seeded from code or a JSON file
//! - [`PgEventStore`]: PostgreSQL through the sqlx pool

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::config::{StoreBackend, StoreConfig};
use crate::database::Database;
use crate::error::Result;
use crate::models::{Booking, Event, EventId, UserId, UserPreferences};

pub mod memory;
pub mod postgres;

pub use memory::{MemoryStore, SeedData};
pub use postgres::PgEventStore;

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Short name used in logs and health output
    fn backend_name(&self) -> &'static str;

    async fn health_check(&self) -> Result<()>;

    /// Release backend resources on shutdown
    async fn close(&self) {}

    /// All public, non-deleted events
    async fn get_public_events(&self) -> Result<Vec<Event>>;

    /// Public, non-deleted events starting after `now`
    async fn get_public_future_events(&self, now: DateTime<Utc>) -> Result<Vec<Event>>;

    /// Events by id regardless of visibility or date. Unknown ids are skipped.
    async fn get_events_by_ids(&self, ids: &[EventId]) -> Result<Vec<Event>>;

    /// `None` when the user never stored preferences
    async fn get_user_preferences(&self, user_id: UserId) -> Result<Option<UserPreferences>>;

    async fn get_liked_event_ids(&self, user_id: UserId) -> Result<Vec<EventId>>;

    async fn get_saved_event_ids(&self, user_id: UserId) -> Result<Vec<EventId>>;

    async fn get_bookings_for_user(&self, user_id: UserId) -> Result<Vec<Booking>>;

    async fn get_followed_user_ids(&self, user_id: UserId) -> Result<Vec<UserId>>;
}

/// Build the backend selected in configuration
pub async fn connect(config: &StoreConfig) -> Result<Arc<dyn EventStore>> {
    match config.backend {
        StoreBackend::Memory => {
            let store = match config.seed_file {
                Some(ref path) => MemoryStore::from_seed_file(path).await?,
                None => MemoryStore::new(),
            };
            Ok(Arc::new(store))
        }
        StoreBackend::Postgres => {
            let db = Database::connect(&config.database).await?;
            if config.run_migrations {
                db.migrate().await?;
            }
            Ok(Arc::new(PgEventStore::new(db)))
        }
    }
}
