//! Eventdeck library crate
//!
//! Event search and personalized recommendations over a typed event store.
//! Re-exports core modules for the server binary and integration tests.

pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod recommendation;
pub mod search;
pub mod service;
pub mod store;

// Re-export commonly used types
pub use config::Config;
pub use database::Database;
pub use error::{Error, Result};
pub use models::{Booking, BookingStatus, Event, InteractionHistory, UserPreferences};
pub use recommendation::{
    InteractionProfile, Ranking, RankingStrategy, RecommendationEngine, ScoredEvent,
    ScoringWeights, Signal,
};
pub use search::{filter_events, FilterCriteria, Pagination};
pub use service::DiscoveryService;
pub use store::{EventStore, MemoryStore, PgEventStore};
