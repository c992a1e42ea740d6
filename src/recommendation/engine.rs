//! Recommendation Engine
//!
//! Ranks upcoming events for a user with a weighted-additive heuristic over
//! declared preferences, inferred interaction categories, coarse location,
//! popularity and social signals. Users with no stored preferences get a
//! popularity ranking instead.
//!
//! Everything here is synchronous and pure: the caller fetches the snapshot.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use tracing::debug;

use super::interactions::InteractionProfile;
use crate::models::{CategoryId, Event, PreferredLocation, UserPreferences};

pub const DEFAULT_LIMIT: usize = 10;
pub const DEFAULT_LOCATION_PREFIX_LEN: usize = 4;

/// Additive weights applied per matching signal
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringWeights {
    pub declared_category: f64,
    pub interaction_category: f64,
    pub preferred_location: f64,
    /// Multiplied by `like_count`
    pub per_like: f64,
    /// Multiplied by `attendee_count`
    pub per_attendee: f64,
    pub virtual_affinity: f64,
    pub followed_creator: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            declared_category: 10.0,
            interaction_category: 8.0,
            preferred_location: 5.0,
            per_like: 0.5,
            per_attendee: 0.3,
            virtual_affinity: 3.0,
            followed_creator: 7.0,
        }
    }
}

/// A signal that contributed to an event's score
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    DeclaredCategory,
    InteractionCategory,
    PreferredLocation { location: String },
    VirtualAffinity,
    FollowedCreator,
    /// Popularity fallback, no personal signal available
    Popularity,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredEvent {
    pub event: Event,
    pub score: f64,
    pub signals: Vec<Signal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingStrategy {
    Personalized,
    Popularity,
}

impl RankingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RankingStrategy::Personalized => "personalized",
            RankingStrategy::Popularity => "popularity",
        }
    }
}

/// Output of a ranking pass
#[derive(Debug, Clone)]
pub struct Ranking {
    pub items: Vec<ScoredEvent>,
    pub strategy: RankingStrategy,
    pub candidates_considered: usize,
}

impl Ranking {
    pub fn into_events(self) -> Vec<Event> {
        self.items.into_iter().map(|s| s.event).collect()
    }
}

/// Per-user state shared by every candidate in one pass
struct ScoringContext<'a> {
    declared_categories: HashSet<CategoryId>,
    locations: &'a [PreferredLocation],
    profile: &'a InteractionProfile,
}

#[derive(Debug, Clone)]
pub struct RecommendationEngine {
    weights: ScoringWeights,
    location_prefix_len: usize,
}

impl Default for RecommendationEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RecommendationEngine {
    pub fn new() -> Self {
        Self {
            weights: ScoringWeights::default(),
            location_prefix_len: DEFAULT_LOCATION_PREFIX_LEN,
        }
    }

    pub fn with_weights(mut self, weights: ScoringWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_location_prefix_len(mut self, len: usize) -> Self {
        self.location_prefix_len = len;
        self
    }

    /// Recommended events, best first
    pub fn recommend(
        &self,
        preferences: Option<&UserPreferences>,
        profile: &InteractionProfile,
        candidates: Vec<Event>,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Vec<Event> {
        self.rank(preferences, profile, candidates, limit, now)
            .into_events()
    }

    /// Score and rank candidates, keeping scores and signals
    pub fn rank(
        &self,
        preferences: Option<&UserPreferences>,
        profile: &InteractionProfile,
        candidates: Vec<Event>,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Ranking {
        let candidates = eligible_candidates(candidates, now);
        let candidates_considered = candidates.len();

        let Some(prefs) = preferences else {
            let items = popularity_ranking(candidates, limit);
            debug!(
                "No stored preferences, popularity fallback returned {}/{} events",
                items.len(),
                candidates_considered
            );
            return Ranking {
                items,
                strategy: RankingStrategy::Popularity,
                candidates_considered,
            };
        };

        let ctx = ScoringContext {
            declared_categories: prefs.categories.iter().copied().collect(),
            locations: &prefs.locations,
            profile,
        };

        let mut scored: Vec<ScoredEvent> = candidates
            .into_iter()
            .map(|event| self.score_event(&ctx, event))
            .collect();

        // stable: ties keep candidate order
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(limit);

        debug!(
            "Scored {} candidates, returning {}",
            candidates_considered,
            scored.len()
        );

        Ranking {
            items: scored,
            strategy: RankingStrategy::Personalized,
            candidates_considered,
        }
    }

    fn score_event(&self, ctx: &ScoringContext<'_>, event: Event) -> ScoredEvent {
        let w = &self.weights;
        let mut score = 0.0;
        let mut signals = Vec::new();

        if let Some(category) = event.category_id {
            if ctx.declared_categories.contains(&category) {
                score += w.declared_category;
                signals.push(Signal::DeclaredCategory);
            }
            if ctx.profile.categories.contains(&category) {
                score += w.interaction_category;
                signals.push(Signal::InteractionCategory);
            }
        }

        if !event.is_virtual {
            if let Some(location) = ctx
                .locations
                .iter()
                .find(|loc| self.location_matches(&event, loc))
            {
                score += w.preferred_location;
                signals.push(Signal::PreferredLocation {
                    location: location.name.clone(),
                });
            }
        }

        score += event.like_count as f64 * w.per_like;
        score += event.attendee_count as f64 * w.per_attendee;

        if event.is_virtual && ctx.profile.has_virtual_booking {
            score += w.virtual_affinity;
            signals.push(Signal::VirtualAffinity);
        }

        if ctx.profile.followed_user_ids.contains(&event.created_by_id) {
            score += w.followed_creator;
            signals.push(Signal::FollowedCreator);
        }

        ScoredEvent {
            event,
            score,
            signals,
        }
    }

    /// Textual prefix comparison of both coordinates. Not a distance check.
    fn location_matches(&self, event: &Event, location: &PreferredLocation) -> bool {
        let (Some(lat), Some(lng)) = (event.latitude.as_deref(), event.longitude.as_deref())
        else {
            return false;
        };
        let n = self.location_prefix_len;
        coordinate_prefix(lat, n) == coordinate_prefix(&location.latitude, n)
            && coordinate_prefix(lng, n) == coordinate_prefix(&location.longitude, n)
    }
}

/// Listed events starting strictly after `now`
pub fn eligible_candidates(candidates: Vec<Event>, now: DateTime<Utc>) -> Vec<Event> {
    candidates
        .into_iter()
        .filter(|e| e.is_listed() && e.is_upcoming(now))
        .collect()
}

fn popularity_ranking(mut candidates: Vec<Event>, limit: usize) -> Vec<ScoredEvent> {
    candidates.sort_by(|a, b| b.like_count.cmp(&a.like_count));
    candidates
        .into_iter()
        .take(limit)
        .map(|event| ScoredEvent {
            score: event.like_count as f64,
            event,
            signals: vec![Signal::Popularity],
        })
        .collect()
}

/// First `len` characters of a coordinate string
fn coordinate_prefix(value: &str, len: usize) -> &str {
    match value.char_indices().nth(len) {
        Some((idx, _)) => &value[..idx],
        None => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::event;
    use std::collections::HashSet;

    const EPS: f64 = 1e-9;

    fn prefs(categories: Vec<CategoryId>) -> UserPreferences {
        UserPreferences {
            categories,
            locations: Vec::new(),
        }
    }

    fn score_of(ranking: &Ranking, id: i64) -> f64 {
        ranking
            .items
            .iter()
            .find(|s| s.event.id == id)
            .map(|s| s.score)
            .expect("event should be ranked")
    }

    #[test]
    fn test_concrete_scenario() {
        let mut a = event(1, 3);
        a.category_id = Some(1);
        a.is_virtual = true;
        a.like_count = 10;
        a.attendee_count = 5;

        let mut b = event(2, 3);
        b.category_id = Some(2);
        b.like_count = 100;
        b.attendee_count = 50;

        let engine = RecommendationEngine::new();
        let ranking = engine.rank(
            Some(&prefs(vec![1])),
            &InteractionProfile::default(),
            vec![a, b],
            DEFAULT_LIMIT,
            Utc::now(),
        );

        assert_eq!(ranking.strategy, RankingStrategy::Personalized);
        let ids: Vec<i64> = ranking.items.iter().map(|s| s.event.id).collect();
        assert_eq!(ids, vec![2, 1]);
        assert!((score_of(&ranking, 1) - 16.5).abs() < EPS);
        assert!((score_of(&ranking, 2) - 65.0).abs() < EPS);
        assert_eq!(ranking.items[1].signals, vec![Signal::DeclaredCategory]);
    }

    #[test]
    fn test_fallback_orders_by_like_count() {
        let mut events = Vec::new();
        for (id, likes) in [(1, 5), (2, 50), (3, 20), (4, 50), (5, 1)] {
            let mut e = event(id, 2);
            e.like_count = likes;
            events.push(e);
        }
        let mut past = event(6, -1);
        past.like_count = 1000;
        events.push(past);

        let ranking = RecommendationEngine::new().rank(
            None,
            &InteractionProfile::default(),
            events,
            3,
            Utc::now(),
        );

        assert_eq!(ranking.strategy, RankingStrategy::Popularity);
        let ids: Vec<i64> = ranking.items.iter().map(|s| s.event.id).collect();
        assert_eq!(ids, vec![2, 4, 3]);
    }

    #[test]
    fn test_declared_category_adds_exactly_its_weight() {
        let mut target = event(1, 2);
        target.category_id = Some(5);
        target.like_count = 3;
        let mut other = event(2, 2);
        other.like_count = 20;

        let engine = RecommendationEngine::new();
        let profile = InteractionProfile::default();
        let now = Utc::now();

        let before = engine.rank(
            Some(&prefs(vec![])),
            &profile,
            vec![target.clone(), other.clone()],
            10,
            now,
        );
        let after = engine.rank(Some(&prefs(vec![5])), &profile, vec![target, other], 10, now);

        let delta = score_of(&after, 1) - score_of(&before, 1);
        assert!((delta - 10.0).abs() < EPS);
        assert!((score_of(&after, 2) - score_of(&before, 2)).abs() < EPS);
        // 11.5 now beats the 10.0 the other event gets from likes
        assert_eq!(after.items[0].event.id, 1);
        assert_eq!(before.items[0].event.id, 2);
    }

    #[test]
    fn test_deleted_private_and_past_events_are_excluded() {
        let mut deleted = event(1, 2);
        deleted.is_deleted = true;
        deleted.like_count = 999;
        let mut private = event(2, 2);
        private.is_public = false;
        private.like_count = 999;
        let mut past = event(3, -2);
        past.like_count = 999;
        past.category_id = Some(1);
        let ok = event(4, 2);

        let engine = RecommendationEngine::new();
        let candidates = vec![deleted, private, past, ok];

        for user_prefs in [None, Some(prefs(vec![1]))] {
            let events = engine.recommend(
                user_prefs.as_ref(),
                &InteractionProfile::default(),
                candidates.clone(),
                10,
                Utc::now(),
            );
            assert_eq!(events.iter().map(|e| e.id).collect::<Vec<_>>(), vec![4]);
        }
    }

    #[test]
    fn test_start_exactly_now_is_not_upcoming() {
        let now = Utc::now();
        let mut e = event(1, 0);
        e.start_date = now;
        assert!(eligible_candidates(vec![e], now).is_empty());
    }

    #[test]
    fn test_interaction_virtual_and_follow_terms() {
        let mut e = event(1, 2);
        e.category_id = Some(9);
        e.is_virtual = true;
        e.created_by_id = 77;

        let profile = InteractionProfile {
            categories: HashSet::from([9]),
            has_virtual_booking: true,
            followed_user_ids: HashSet::from([77]),
        };

        let ranking =
            RecommendationEngine::new().rank(Some(&prefs(vec![9])), &profile, vec![e], 10, Utc::now());
        let item = &ranking.items[0];
        assert!((item.score - (10.0 + 8.0 + 3.0 + 7.0)).abs() < EPS);
        assert_eq!(
            item.signals,
            vec![
                Signal::DeclaredCategory,
                Signal::InteractionCategory,
                Signal::VirtualAffinity,
                Signal::FollowedCreator,
            ]
        );
    }

    #[test]
    fn test_location_prefix_match_only_for_physical_events() {
        let home = PreferredLocation {
            name: "Home".to_string(),
            latitude: "40.7128".to_string(),
            longitude: "-74.0060".to_string(),
        };
        let user = UserPreferences {
            categories: vec![],
            locations: vec![home],
        };

        let mut near = event(1, 2);
        near.latitude = Some("40.7306".to_string());
        near.longitude = Some("-74.0301".to_string());

        let mut far = event(2, 2);
        far.latitude = Some("41.8781".to_string());
        far.longitude = Some("-74.0060".to_string());

        let mut virtual_near = near.clone();
        virtual_near.id = 3;
        virtual_near.is_virtual = true;

        let no_coords = event(4, 2);

        let ranking = RecommendationEngine::new().rank(
            Some(&user),
            &InteractionProfile::default(),
            vec![near, far, virtual_near, no_coords],
            10,
            Utc::now(),
        );

        assert!((score_of(&ranking, 1) - 5.0).abs() < EPS);
        assert!(score_of(&ranking, 2).abs() < EPS);
        assert!(score_of(&ranking, 3).abs() < EPS);
        assert!(score_of(&ranking, 4).abs() < EPS);
        assert_eq!(
            ranking.items[0].signals,
            vec![Signal::PreferredLocation {
                location: "Home".to_string()
            }]
        );
    }

    #[test]
    fn test_ties_keep_candidate_order_and_limit_truncates() {
        let events: Vec<Event> = (1..=6).map(|id| event(id, 2)).collect();
        let ids: Vec<i64> = RecommendationEngine::new()
            .recommend(
                Some(&prefs(vec![])),
                &InteractionProfile::default(),
                events,
                4,
                Utc::now(),
            )
            .iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_coordinate_prefix() {
        assert_eq!(coordinate_prefix("40.7128", 4), "40.7");
        assert_eq!(coordinate_prefix("-7", 4), "-7");
        assert_eq!(coordinate_prefix("", 4), "");
    }

    #[test]
    fn test_custom_weights() {
        let mut e = event(1, 2);
        e.like_count = 4;
        let weights = ScoringWeights {
            per_like: 2.0,
            ..ScoringWeights::default()
        };
        let ranking = RecommendationEngine::new().with_weights(weights).rank(
            Some(&prefs(vec![])),
            &InteractionProfile::default(),
            vec![e],
            1,
            Utc::now(),
        );
        assert!((ranking.items[0].score - 8.0).abs() < EPS);
    }
}
