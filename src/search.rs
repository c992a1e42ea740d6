//! Event Search
//!
//! Declarative filtering over listed events. Every criterion is optional and
//! an absent criterion places no constraint on its dimension. Matching is
//! plain equality / substring: no stemming, fuzzy matching or relevance.
//!
//! Criteria are assumed to be well-typed already; contradictory input such as
//! an `end_date` before `start_date` or a negative `max_price` simply yields
//! fewer (or no) events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{CategoryId, Event};

/// Filter criteria for event search
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterCriteria {
    /// Case-insensitive substring of title or description
    pub query: Option<String>,
    pub category_id: Option<CategoryId>,
    /// Lower bound on the event start, inclusive
    pub start_date: Option<DateTime<Utc>>,
    /// Upper bound on the event start, inclusive
    pub end_date: Option<DateTime<Utc>>,
    pub is_free: Option<bool>,
    pub is_virtual: Option<bool>,
    pub is_hybrid: Option<bool>,
    pub max_price: Option<f64>,
}

/// Offset/limit slicing applied after sorting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub offset: usize,
    pub limit: Option<usize>,
}

impl FilterCriteria {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// True when the event satisfies every supplied criterion
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(ref query) = self.query {
            if !matches_query(event, &query.to_lowercase()) {
                return false;
            }
        }

        if let Some(category_id) = self.category_id {
            if event.category_id != Some(category_id) {
                return false;
            }
        }

        if let Some(start) = self.start_date {
            if event.start_date < start {
                return false;
            }
        }

        if let Some(end) = self.end_date {
            if event.start_date > end {
                return false;
            }
        }

        if self.is_free == Some(true) && !event.is_free {
            return false;
        }

        if self.is_virtual == Some(true) && !event.is_virtual {
            return false;
        }

        if self.is_hybrid == Some(true) && !event.is_hybrid {
            return false;
        }

        if let Some(max_price) = self.max_price {
            if !within_price(event, max_price) {
                return false;
            }
        }

        true
    }
}

fn matches_query(event: &Event, needle: &str) -> bool {
    event.title.to_lowercase().contains(needle)
        || event
            .description
            .as_deref()
            .map(|d| d.to_lowercase().contains(needle))
            .unwrap_or(false)
}

/// Free events always pass; a priced event without a price never does.
fn within_price(event: &Event, max_price: f64) -> bool {
    event.is_free || event.price.map(|p| p <= max_price).unwrap_or(false)
}

/// Listed events matching `criteria`, soonest first
pub fn filter_events(all_events: &[Event], criteria: &FilterCriteria) -> Vec<Event> {
    let mut matched: Vec<Event> = all_events
        .iter()
        .filter(|e| e.is_listed() && criteria.matches(e))
        .cloned()
        .collect();

    // stable: equal start dates keep input order
    matched.sort_by(|a, b| a.start_date.cmp(&b.start_date));

    debug!(
        "Search matched {}/{} events (criteria empty: {})",
        matched.len(),
        all_events.len(),
        criteria.is_empty()
    );

    matched
}

/// `filter_events` followed by offset/limit slicing
pub fn filter_events_paged(
    all_events: &[Event],
    criteria: &FilterCriteria,
    page: Pagination,
) -> Vec<Event> {
    let matched = filter_events(all_events, criteria);
    let remaining = matched.into_iter().skip(page.offset);

    match page.limit {
        Some(limit) => remaining.take(limit).collect(),
        None => remaining.collect(),
    }
}
