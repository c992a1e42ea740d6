//! In-memory event store
//!
//! Backs local development and tests. State lives behind a tokio `RwLock`;
//! readers clone out snapshots so no lock is held while callers compute.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::{info, instrument};

use super::EventStore;
use crate::error::{Error, Result};
use crate::models::{Booking, Event, EventId, InteractionHistory, UserId, UserPreferences};

const BACKEND: &str = "memory";

/// JSON seed document for the memory backend
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedData {
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde(default)]
    pub users: Vec<SeedUser>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedUser {
    pub id: UserId,
    #[serde(default)]
    pub preferences: Option<UserPreferences>,
    #[serde(flatten)]
    pub history: InteractionHistory,
}

#[derive(Default)]
struct Inner {
    events: BTreeMap<EventId, Event>,
    preferences: HashMap<UserId, UserPreferences>,
    histories: HashMap<UserId, InteractionHistory>,
}

pub struct MemoryStore {
    inner: RwLock<Inner>,
    available: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            available: AtomicBool::new(true),
        }
    }

    pub fn from_seed(seed: SeedData) -> Self {
        let mut inner = Inner::default();
        for event in seed.events {
            inner.events.insert(event.id, event);
        }
        for user in seed.users {
            if let Some(prefs) = user.preferences {
                inner.preferences.insert(user.id, prefs);
            }
            inner.histories.insert(user.id, user.history);
        }

        Self {
            inner: RwLock::new(inner),
            available: AtomicBool::new(true),
        }
    }

    pub async fn from_seed_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await?;
        let seed: SeedData = serde_json::from_str(&raw)?;
        info!(
            "Seeded memory store from {} ({} events, {} users)",
            path.display(),
            seed.events.len(),
            seed.users.len()
        );
        Ok(Self::from_seed(seed))
    }

    /// Simulate an outage: every read fails while unavailable
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::StoreUnavailable { backend: BACKEND })
        }
    }

    pub async fn insert_event(&self, event: Event) {
        self.inner.write().await.events.insert(event.id, event);
    }

    pub async fn set_preferences(&self, user_id: UserId, preferences: UserPreferences) {
        self.inner
            .write()
            .await
            .preferences
            .insert(user_id, preferences);
    }

    pub async fn add_like(&self, user_id: UserId, event_id: EventId) {
        self.with_history(user_id, |h| h.liked_event_ids.push(event_id))
            .await;
    }

    pub async fn add_save(&self, user_id: UserId, event_id: EventId) {
        self.with_history(user_id, |h| h.saved_event_ids.push(event_id))
            .await;
    }

    pub async fn add_booking(&self, user_id: UserId, booking: Booking) {
        self.with_history(user_id, |h| h.bookings.push(booking))
            .await;
    }

    pub async fn add_follow(&self, follower_id: UserId, followed_id: UserId) {
        self.with_history(follower_id, |h| h.followed_user_ids.push(followed_id))
            .await;
    }

    async fn with_history(&self, user_id: UserId, f: impl FnOnce(&mut InteractionHistory)) {
        let mut inner = self.inner.write().await;
        f(inner.histories.entry(user_id).or_default());
    }

    async fn history_field<T>(
        &self,
        user_id: UserId,
        f: impl FnOnce(&InteractionHistory) -> Vec<T>,
    ) -> Result<Vec<T>> {
        self.ensure_available()?;
        let inner = self.inner.read().await;
        Ok(inner.histories.get(&user_id).map(f).unwrap_or_default())
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    async fn health_check(&self) -> Result<()> {
        self.ensure_available()
    }

    #[instrument(skip(self))]
    async fn get_public_events(&self) -> Result<Vec<Event>> {
        self.ensure_available()?;
        let inner = self.inner.read().await;
        Ok(inner
            .events
            .values()
            .filter(|e| e.is_listed())
            .cloned()
            .collect())
    }

    #[instrument(skip(self))]
    async fn get_public_future_events(&self, now: DateTime<Utc>) -> Result<Vec<Event>> {
        self.ensure_available()?;
        let inner = self.inner.read().await;
        Ok(inner
            .events
            .values()
            .filter(|e| e.is_listed() && e.is_upcoming(now))
            .cloned()
            .collect())
    }

    async fn get_events_by_ids(&self, ids: &[EventId]) -> Result<Vec<Event>> {
        self.ensure_available()?;
        let inner = self.inner.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| inner.events.get(id).cloned())
            .collect())
    }

    async fn get_user_preferences(&self, user_id: UserId) -> Result<Option<UserPreferences>> {
        self.ensure_available()?;
        Ok(self.inner.read().await.preferences.get(&user_id).cloned())
    }

    async fn get_liked_event_ids(&self, user_id: UserId) -> Result<Vec<EventId>> {
        self.history_field(user_id, |h| h.liked_event_ids.clone())
            .await
    }

    async fn get_saved_event_ids(&self, user_id: UserId) -> Result<Vec<EventId>> {
        self.history_field(user_id, |h| h.saved_event_ids.clone())
            .await
    }

    async fn get_bookings_for_user(&self, user_id: UserId) -> Result<Vec<Booking>> {
        self.history_field(user_id, |h| h.bookings.clone()).await
    }

    async fn get_followed_user_ids(&self, user_id: UserId) -> Result<Vec<UserId>> {
        self.history_field(user_id, |h| h.followed_user_ids.clone())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::event;
    use crate::models::BookingStatus;
    use std::io::Write;

    #[tokio::test]
    async fn test_public_queries_hide_unlisted_events() {
        let store = MemoryStore::new();
        let mut hidden = event(2, 3);
        hidden.is_public = false;
        store.insert_event(event(1, 3)).await;
        store.insert_event(hidden).await;
        store.insert_event(event(3, -3)).await;

        let public: Vec<EventId> = store
            .get_public_events()
            .await
            .unwrap()
            .iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(public, vec![1, 3]);

        let future: Vec<EventId> = store
            .get_public_future_events(Utc::now())
            .await
            .unwrap()
            .iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(future, vec![1]);

        // lookups by id ignore visibility
        let by_id = store.get_events_by_ids(&[2, 99]).await.unwrap();
        assert_eq!(by_id.len(), 1);
        assert_eq!(by_id[0].id, 2);
    }

    #[tokio::test]
    async fn test_history_and_preferences() {
        let store = MemoryStore::new();
        assert_eq!(store.get_user_preferences(1).await.unwrap(), None);
        assert!(store.get_liked_event_ids(1).await.unwrap().is_empty());

        store
            .set_preferences(
                1,
                UserPreferences {
                    categories: vec![4],
                    locations: vec![],
                },
            )
            .await;
        store.add_like(1, 10).await;
        store.add_save(1, 11).await;
        store
            .add_booking(
                1,
                Booking {
                    event_id: 12,
                    status: BookingStatus::Confirmed,
                },
            )
            .await;
        store.add_follow(1, 2).await;

        assert_eq!(
            store.get_user_preferences(1).await.unwrap().unwrap().categories,
            vec![4]
        );
        assert_eq!(store.get_liked_event_ids(1).await.unwrap(), vec![10]);
        assert_eq!(store.get_saved_event_ids(1).await.unwrap(), vec![11]);
        assert_eq!(store.get_bookings_for_user(1).await.unwrap()[0].event_id, 12);
        assert_eq!(store.get_followed_user_ids(1).await.unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_every_read() {
        let store = MemoryStore::new();
        store.set_available(false);

        assert!(matches!(
            store.get_public_events().await,
            Err(Error::StoreUnavailable { .. })
        ));
        assert!(store.get_bookings_for_user(1).await.is_err());
        assert!(store.health_check().await.is_err());

        store.set_available(true);
        assert!(store.health_check().await.is_ok());

        // nothing to release for the memory backend
        store.close().await;
        assert!(store.health_check().await.is_ok());
    }

    #[tokio::test]
    async fn test_seed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "events": [{{
                    "id": 1, "title": "Rooftop Jazz", "startDate": "2099-06-01T19:00:00Z",
                    "isPublic": true, "isFree": false, "price": 15.0,
                    "categoryId": 3, "likeCount": 4, "createdById": 7
                }}],
                "users": [{{
                    "id": 5,
                    "preferences": {{ "categories": [3] }},
                    "likedEventIds": [1],
                    "bookings": [{{ "eventId": 1, "status": "confirmed" }}],
                    "followedUserIds": [7]
                }}]
            }}"#
        )
        .unwrap();

        let store = MemoryStore::from_seed_file(file.path()).await.unwrap();
        let events = store.get_public_events().await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].price, Some(15.0));
        assert!(!events[0].is_deleted);

        assert_eq!(store.get_liked_event_ids(5).await.unwrap(), vec![1]);
        assert!(store.get_saved_event_ids(5).await.unwrap().is_empty());
        assert_eq!(
            store.get_bookings_for_user(5).await.unwrap()[0].status,
            BookingStatus::Confirmed
        );
        assert_eq!(store.get_followed_user_ids(5).await.unwrap(), vec![7]);
    }
}
