//! Interaction Profile
//!
//! Condenses a user's raw interaction history into the signals the scorer
//! consumes. Referenced events are looked up regardless of visibility or
//! date: a like on a past or since-deleted event still says something about
//! the user's taste.

use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::models::{CategoryId, Event, EventId, InteractionHistory, UserId};

/// Signals derived from likes, saves, bookings and follows
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InteractionProfile {
    /// Categories of every liked, saved or booked event
    pub categories: HashSet<CategoryId>,
    /// At least one booking (any status) was for a virtual event
    pub has_virtual_booking: bool,
    pub followed_user_ids: HashSet<UserId>,
}

impl InteractionProfile {
    /// Build the profile from the history and the events it references.
    ///
    /// Ids with no matching entry in `referenced` are skipped.
    pub fn derive(history: &InteractionHistory, referenced: &[Event]) -> Self {
        let by_id: HashMap<EventId, &Event> = referenced.iter().map(|e| (e.id, e)).collect();

        let booked_ids = history.bookings.iter().map(|b| b.event_id);

        let categories = history
            .liked_event_ids
            .iter()
            .chain(history.saved_event_ids.iter())
            .copied()
            .chain(booked_ids.clone())
            .filter_map(|id| by_id.get(&id).and_then(|e| e.category_id))
            .collect();

        let has_virtual_booking = booked_ids
            .filter_map(|id| by_id.get(&id))
            .any(|e| e.is_virtual);

        Self {
            categories,
            has_virtual_booking,
            followed_user_ids: history.followed_user_ids.iter().copied().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty() && !self.has_virtual_booking && self.followed_user_ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::event;
    use crate::models::{Booking, BookingStatus};

    fn with_category(id: EventId, category: CategoryId) -> Event {
        Event {
            category_id: Some(category),
            ..event(id, -10)
        }
    }

    #[test]
    fn test_categories_union_likes_saves_bookings() {
        let referenced = vec![
            with_category(1, 10),
            with_category(2, 20),
            with_category(3, 30),
            event(4, 1),
        ];
        let history = InteractionHistory {
            liked_event_ids: vec![1],
            saved_event_ids: vec![2, 4],
            bookings: vec![Booking {
                event_id: 3,
                status: BookingStatus::Cancelled,
            }],
            followed_user_ids: vec![99],
        };

        let profile = InteractionProfile::derive(&history, &referenced);
        assert_eq!(profile.categories, HashSet::from([10, 20, 30]));
        assert!(!profile.has_virtual_booking);
        assert_eq!(profile.followed_user_ids, HashSet::from([99]));
    }

    #[test]
    fn test_virtual_booking_ignores_likes_and_status() {
        let mut liked_virtual = event(1, 2);
        liked_virtual.is_virtual = true;
        let history = InteractionHistory {
            liked_event_ids: vec![1],
            ..Default::default()
        };
        assert!(!InteractionProfile::derive(&history, &[liked_virtual.clone()]).has_virtual_booking);

        let booked = InteractionHistory {
            bookings: vec![Booking {
                event_id: 1,
                status: BookingStatus::Pending,
            }],
            ..Default::default()
        };
        assert!(InteractionProfile::derive(&booked, &[liked_virtual]).has_virtual_booking);
    }

    #[test]
    fn test_unknown_ids_are_skipped() {
        let history = InteractionHistory {
            liked_event_ids: vec![42],
            ..Default::default()
        };
        let profile = InteractionProfile::derive(&history, &[]);
        assert!(profile.is_empty());
    }
}
