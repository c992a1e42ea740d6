//! Recommendation Module
//!
//! Personalized upcoming-event recommendations.
//!
//! ## Architecture
//!
//! 1. **Interactions** - Condense likes, saves, bookings and follows into an `InteractionProfile`
//! 2. **Engine** - Score and rank candidate events against preferences and the profile
//! 3. **Metrics** - Per-request timing and quality bookkeeping
//!
//! ## Algorithm Overview
//!
//! Candidates are public, non-deleted events starting after "now". Users with
//! no stored preferences get the most-liked candidates. Everyone else gets an
//! additive score per event:
//! - Declared category match: +10
//! - Category seen in likes/saves/bookings: +8
//! - Physical event near a declared location (coordinate prefix match): +5
//! - 0.5 per like, 0.3 per attendee
//! - Virtual event for a user who has booked virtual events: +3
//! - Created by someone the user follows: +7

pub mod engine;
pub mod interactions;
pub mod metrics;

pub use engine::{
    Ranking, RankingStrategy, RecommendationEngine, ScoredEvent, ScoringWeights, Signal,
};
pub use interactions::InteractionProfile;
