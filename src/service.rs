//! Discovery service
//!
//! Glue between the async store and the pure search/recommendation code.
//! Each call fetches one snapshot (all store reads concurrently, bounded by
//! the configured fetch timeout) and then computes on it without touching
//! the store again.

use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::config::RecommendationConfig;
use crate::error::{Error, Result};
use crate::models::{Event, InteractionHistory, UserId, UserPreferences};
use crate::recommendation::metrics::{PerformanceTimer, RecommendationMetrics};
use crate::recommendation::{InteractionProfile, Ranking, RecommendationEngine};
use crate::search::{self, FilterCriteria, Pagination};
use crate::store::EventStore;

/// Everything recommendation reads for one user
struct UserSnapshot {
    preferences: Option<UserPreferences>,
    profile: InteractionProfile,
    candidates: Vec<Event>,
}

#[derive(Clone)]
pub struct DiscoveryService {
    store: Arc<dyn EventStore>,
    engine: RecommendationEngine,
    config: RecommendationConfig,
}

impl DiscoveryService {
    pub fn new(store: Arc<dyn EventStore>, config: RecommendationConfig) -> Self {
        let engine =
            RecommendationEngine::new().with_location_prefix_len(config.location_prefix_len);
        Self {
            store,
            engine,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    /// Requested limit, defaulted and clamped to the configured maximum
    pub fn effective_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.config.default_limit)
            .min(self.config.max_limit)
    }

    /// Public events matching `criteria`, soonest first
    #[instrument(skip(self, criteria))]
    pub async fn search(&self, criteria: &FilterCriteria, page: Pagination) -> Result<Vec<Event>> {
        let events = self
            .bounded(self.store.get_public_events())
            .await?;
        Ok(search::filter_events_paged(&events, criteria, page))
    }

    /// Recommended upcoming events for `user_id`, best first
    #[instrument(skip(self))]
    pub async fn recommend(&self, user_id: UserId, limit: Option<usize>) -> Result<Vec<Event>> {
        Ok(self.explain(user_id, limit).await?.into_events())
    }

    /// Same ranking as `recommend`, keeping scores and matched signals
    #[instrument(skip(self))]
    pub async fn explain(&self, user_id: UserId, limit: Option<usize>) -> Result<Ranking> {
        let total_timer = PerformanceTimer::new("recommendation_request");
        let mut metrics = RecommendationMetrics::new(user_id);
        let limit = self.effective_limit(limit);
        let now = Utc::now();

        let fetch_timer = PerformanceTimer::new("recommendation_fetch");
        let snapshot = self.bounded(self.fetch_snapshot(user_id, now)).await?;
        metrics.fetch_duration_ms = fetch_timer.elapsed_ms();

        let scoring_timer = PerformanceTimer::new("recommendation_scoring");
        let ranking = self.engine.rank(
            snapshot.preferences.as_ref(),
            &snapshot.profile,
            snapshot.candidates,
            limit,
            now,
        );
        metrics.scoring_duration_ms = scoring_timer.elapsed_ms();

        metrics.observe_ranking(&ranking);
        metrics.total_duration_ms = total_timer.elapsed_ms();
        metrics.record(self.config.slow_threshold_ms);

        Ok(ranking)
    }

    async fn fetch_snapshot(&self, user_id: UserId, now: DateTime<Utc>) -> Result<UserSnapshot> {
        let store = &self.store;
        let (
            preferences,
            liked_event_ids,
            saved_event_ids,
            bookings,
            followed_user_ids,
            candidates,
        ) = tokio::try_join!(
            store.get_user_preferences(user_id),
            store.get_liked_event_ids(user_id),
            store.get_saved_event_ids(user_id),
            store.get_bookings_for_user(user_id),
            store.get_followed_user_ids(user_id),
            store.get_public_future_events(now),
        )?;

        let history = InteractionHistory {
            liked_event_ids,
            saved_event_ids,
            bookings,
            followed_user_ids,
        };

        // Past or hidden events still tell us what the user is into
        let referenced = store
            .get_events_by_ids(&history.referenced_event_ids())
            .await?;
        let profile = InteractionProfile::derive(&history, &referenced);

        debug!(
            user_id,
            has_preferences = preferences.is_some(),
            interaction_categories = profile.categories.len(),
            follows = profile.followed_user_ids.len(),
            candidates = candidates.len(),
            "Fetched recommendation snapshot"
        );

        Ok(UserSnapshot {
            preferences,
            profile,
            candidates,
        })
    }

    /// Run a store fetch under the configured timeout
    async fn bounded<T>(&self, fetch: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.config.fetch_timeout, fetch).await {
            Ok(result) => result,
            Err(_) => {
                let timeout_ms = self.config.fetch_timeout.as_millis() as u64;
                warn!(
                    backend = self.store.backend_name(),
                    timeout_ms, "Store fetch timed out"
                );
                Err(Error::Timeout { timeout_ms })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::event;
    use crate::models::{Booking, BookingStatus, EventId};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::time::Duration;

    fn ids(events: &[Event]) -> Vec<EventId> {
        events.iter().map(|e| e.id).collect()
    }

    async fn seeded() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());

        let mut jazz = event(1, 5);
        jazz.category_id = Some(3);
        jazz.like_count = 2;
        store.insert_event(jazz).await;

        let mut popular = event(2, 6);
        popular.category_id = Some(8);
        popular.like_count = 30;
        store.insert_event(popular).await;

        let mut past_jazz = event(3, -10);
        past_jazz.category_id = Some(3);
        store.insert_event(past_jazz).await;

        let mut webinar = event(4, 2);
        webinar.is_virtual = true;
        webinar.is_free = false;
        webinar.price = Some(20.0);
        store.insert_event(webinar).await;

        store
    }

    fn service(store: Arc<MemoryStore>) -> DiscoveryService {
        DiscoveryService::new(store, RecommendationConfig::default())
    }

    #[tokio::test]
    async fn test_search_filters_and_pages() {
        let svc = service(seeded().await);

        let all = svc
            .search(&FilterCriteria::default(), Pagination::default())
            .await
            .unwrap();
        assert_eq!(ids(&all), vec![3, 4, 1, 2]);

        let free = FilterCriteria {
            is_free: Some(true),
            ..Default::default()
        };
        let page = Pagination {
            offset: 1,
            limit: Some(1),
        };
        assert_eq!(ids(&svc.search(&free, page).await.unwrap()), vec![1]);
    }

    #[tokio::test]
    async fn test_recommend_without_preferences_uses_popularity() {
        let svc = service(seeded().await);
        let events = svc.recommend(42, None).await.unwrap();
        // past event 3 is never a candidate
        assert_eq!(ids(&events), vec![2, 1, 4]);
    }

    #[tokio::test]
    async fn test_interaction_with_past_event_boosts_category() {
        let store = seeded().await;
        store.set_preferences(7, UserPreferences::default()).await;
        store.add_like(7, 3).await;
        let svc = service(store);

        let ranking = svc.explain(7, Some(2)).await.unwrap();
        // event 1: 8 (category 3 via past like) + 1 = 9, event 2: 15
        assert_eq!(ranking.items.len(), 2);
        assert_eq!(ranking.items[0].event.id, 2);
        assert_eq!(ranking.items[1].event.id, 1);
        assert!((ranking.items[1].score - 9.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_virtual_booking_affinity() {
        let store = seeded().await;
        store.set_preferences(9, UserPreferences::default()).await;
        store
            .add_booking(
                9,
                Booking {
                    event_id: 4,
                    status: BookingStatus::Cancelled,
                },
            )
            .await;
        let svc = service(store);

        let ranking = svc.explain(9, None).await.unwrap();
        let webinar = ranking
            .items
            .iter()
            .find(|s| s.event.id == 4)
            .unwrap();
        assert!(webinar
            .signals
            .contains(&crate::recommendation::Signal::VirtualAffinity));
    }

    #[tokio::test]
    async fn test_limit_is_defaulted_and_clamped() {
        let store = Arc::new(MemoryStore::new());
        for id in 0..150 {
            store.insert_event(event(id, 1 + id % 7)).await;
        }
        let svc = service(store);

        assert_eq!(svc.effective_limit(None), 10);
        assert_eq!(svc.effective_limit(Some(1_000)), 100);
        assert_eq!(svc.recommend(1, None).await.unwrap().len(), 10);
        assert_eq!(svc.recommend(1, Some(1_000)).await.unwrap().len(), 100);
        assert!(svc.recommend(1, Some(0)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_outage_propagates() {
        let store = seeded().await;
        store.set_available(false);
        let svc = service(store);

        assert!(matches!(
            svc.recommend(1, None).await,
            Err(Error::StoreUnavailable { .. })
        ));
        assert!(matches!(
            svc.search(&FilterCriteria::default(), Pagination::default())
                .await,
            Err(Error::StoreUnavailable { .. })
        ));
    }

    /// Delegates to a memory store after a fixed delay
    struct SlowStore {
        inner: MemoryStore,
        delay: Duration,
    }

    #[async_trait]
    impl EventStore for SlowStore {
        fn backend_name(&self) -> &'static str {
            "slow"
        }

        async fn health_check(&self) -> Result<()> {
            self.inner.health_check().await
        }

        async fn get_public_events(&self) -> Result<Vec<Event>> {
            tokio::time::sleep(self.delay).await;
            self.inner.get_public_events().await
        }

        async fn get_public_future_events(&self, now: DateTime<Utc>) -> Result<Vec<Event>> {
            tokio::time::sleep(self.delay).await;
            self.inner.get_public_future_events(now).await
        }

        async fn get_events_by_ids(&self, ids: &[EventId]) -> Result<Vec<Event>> {
            self.inner.get_events_by_ids(ids).await
        }

        async fn get_user_preferences(&self, user_id: UserId) -> Result<Option<UserPreferences>> {
            self.inner.get_user_preferences(user_id).await
        }

        async fn get_liked_event_ids(&self, user_id: UserId) -> Result<Vec<EventId>> {
            self.inner.get_liked_event_ids(user_id).await
        }

        async fn get_saved_event_ids(&self, user_id: UserId) -> Result<Vec<EventId>> {
            self.inner.get_saved_event_ids(user_id).await
        }

        async fn get_bookings_for_user(&self, user_id: UserId) -> Result<Vec<Booking>> {
            self.inner.get_bookings_for_user(user_id).await
        }

        async fn get_followed_user_ids(&self, user_id: UserId) -> Result<Vec<UserId>> {
            self.inner.get_followed_user_ids(user_id).await
        }
    }

    #[tokio::test]
    async fn test_slow_store_times_out() {
        let store = Arc::new(SlowStore {
            inner: MemoryStore::new(),
            delay: Duration::from_millis(500),
        });
        let config = RecommendationConfig {
            fetch_timeout: Duration::from_millis(20),
            ..Default::default()
        };
        let svc = DiscoveryService::new(store, config);

        assert!(matches!(
            svc.recommend(1, None).await,
            Err(Error::Timeout { timeout_ms: 20 })
        ));
        assert!(matches!(
            svc.search(&FilterCriteria::default(), Pagination::default())
                .await,
            Err(Error::Timeout { .. })
        ));
    }
}
