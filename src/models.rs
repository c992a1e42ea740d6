//! Domain records shared by the store, search and recommendation modules.
//!
//! All of these are read-only, request-scoped snapshots. Counters such as
//! `like_count` are owned by other parts of the platform and only read here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type EventId = i64;
pub type UserId = i64;
pub type CategoryId = i64;

/// An event as seen by search and recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: EventId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,

    pub start_date: DateTime<Utc>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,

    #[serde(default)]
    pub category_id: Option<CategoryId>,

    pub is_public: bool,
    #[serde(default)]
    pub is_deleted: bool,

    pub is_free: bool,
    /// Only meaningful when `is_free` is false
    #[serde(default)]
    pub price: Option<f64>,

    #[serde(default)]
    pub is_virtual: bool,
    #[serde(default)]
    pub is_hybrid: bool,

    #[serde(default)]
    pub latitude: Option<String>,
    #[serde(default)]
    pub longitude: Option<String>,

    #[serde(default)]
    pub like_count: i64,
    #[serde(default)]
    pub attendee_count: i64,

    pub created_by_id: UserId,
}

impl Event {
    /// Public and not soft-deleted. Nothing else may ever be returned.
    pub fn is_listed(&self) -> bool {
        self.is_public && !self.is_deleted
    }

    /// Starts strictly after `now`
    pub fn is_upcoming(&self, now: DateTime<Utc>) -> bool {
        self.start_date > now
    }
}

/// A named location the user opted into
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferredLocation {
    pub name: String,
    pub latitude: String,
    pub longitude: String,
}

/// Declared preferences from the user's profile settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPreferences {
    #[serde(default)]
    pub categories: Vec<CategoryId>,
    #[serde(default)]
    pub locations: Vec<PreferredLocation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    #[serde(untagged)]
    Other(String),
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookingStatus::Pending => write!(f, "pending"),
            BookingStatus::Confirmed => write!(f, "confirmed"),
            BookingStatus::Cancelled => write!(f, "cancelled"),
            BookingStatus::Other(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for BookingStatus {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pending" => BookingStatus::Pending,
            "confirmed" => BookingStatus::Confirmed,
            "cancelled" | "canceled" => BookingStatus::Cancelled,
            other => BookingStatus::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub event_id: EventId,
    pub status: BookingStatus,
}

/// Everything the user did that recommendation looks at
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionHistory {
    #[serde(default)]
    pub liked_event_ids: Vec<EventId>,
    #[serde(default)]
    pub saved_event_ids: Vec<EventId>,
    #[serde(default)]
    pub bookings: Vec<Booking>,
    #[serde(default)]
    pub followed_user_ids: Vec<UserId>,
}

impl InteractionHistory {
    /// Ids of every event the user liked, saved or booked, deduplicated
    pub fn referenced_event_ids(&self) -> Vec<EventId> {
        let mut ids: Vec<EventId> = self
            .liked_event_ids
            .iter()
            .chain(self.saved_event_ids.iter())
            .copied()
            .chain(self.bookings.iter().map(|b| b.event_id))
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}
