//! PostgreSQL event store
//!
//! Reads the tables created by `migrations/`. Every method is a single query
//! against the shared pool; errors map through `From<sqlx::Error>`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::instrument;

use super::EventStore;
use crate::database::Database;
use crate::error::{Error, Result};
use crate::models::{
    Booking, BookingStatus, Event, EventId, PreferredLocation, UserId, UserPreferences,
};

const EVENT_COLUMNS: &str = r#"
    id, title, description, start_date, end_date, category_id,
    is_public, is_deleted, is_free, price, is_virtual, is_hybrid,
    latitude, longitude, like_count, attendee_count, created_by_id
"#;

/// Database row for events
#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    id: i64,
    title: String,
    description: Option<String>,
    start_date: DateTime<Utc>,
    end_date: Option<DateTime<Utc>>,
    category_id: Option<i64>,
    is_public: bool,
    is_deleted: bool,
    is_free: bool,
    price: Option<f64>,
    is_virtual: bool,
    is_hybrid: bool,
    latitude: Option<String>,
    longitude: Option<String>,
    like_count: i64,
    attendee_count: i64,
    created_by_id: i64,
}

impl From<EventRow> for Event {
    fn from(row: EventRow) -> Self {
        Event {
            id: row.id,
            title: row.title,
            description: row.description,
            start_date: row.start_date,
            end_date: row.end_date,
            category_id: row.category_id,
            is_public: row.is_public,
            is_deleted: row.is_deleted,
            is_free: row.is_free,
            price: row.price,
            is_virtual: row.is_virtual,
            is_hybrid: row.is_hybrid,
            latitude: row.latitude,
            longitude: row.longitude,
            like_count: row.like_count,
            attendee_count: row.attendee_count,
            created_by_id: row.created_by_id,
        }
    }
}

/// Database row for preferences
#[derive(Debug, sqlx::FromRow)]
struct PreferencesRow {
    categories: Vec<i64>,
    locations: serde_json::Value,
}

impl TryFrom<PreferencesRow> for UserPreferences {
    type Error = Error;

    fn try_from(row: PreferencesRow) -> Result<Self> {
        let locations: Vec<PreferredLocation> = serde_json::from_value(row.locations)
            .map_err(|e| Error::invalid_data(format!("user_preferences.locations: {}", e)))?;
        Ok(UserPreferences {
            categories: row.categories,
            locations,
        })
    }
}

#[derive(Clone)]
pub struct PgEventStore {
    db: Database,
}

impl PgEventStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    async fn fetch_events(&self, sql: &str) -> Result<Vec<Event>> {
        let rows = sqlx::query_as::<_, EventRow>(sql)
            .fetch_all(self.db.pool())
            .await?;
        Ok(rows.into_iter().map(Event::from).collect())
    }

    async fn fetch_ids(&self, sql: &str, user_id: UserId) -> Result<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>(sql)
            .bind(user_id)
            .fetch_all(self.db.pool())
            .await?;
        Ok(ids)
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn health_check(&self) -> Result<()> {
        self.db.health_check().await
    }

    async fn close(&self) {
        self.db.close().await;
    }

    #[instrument(skip(self))]
    async fn get_public_events(&self) -> Result<Vec<Event>> {
        let sql = format!(
            "SELECT {} FROM events WHERE is_public = true AND is_deleted = false",
            EVENT_COLUMNS
        );
        self.fetch_events(&sql).await
    }

    #[instrument(skip(self))]
    async fn get_public_future_events(&self, now: DateTime<Utc>) -> Result<Vec<Event>> {
        let sql = format!(
            r#"
            SELECT {} FROM events
            WHERE is_public = true AND is_deleted = false AND start_date > $1
            ORDER BY start_date ASC
            "#,
            EVENT_COLUMNS
        );
        let rows = sqlx::query_as::<_, EventRow>(&sql)
            .bind(now)
            .fetch_all(self.db.pool())
            .await?;
        Ok(rows.into_iter().map(Event::from).collect())
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn get_events_by_ids(&self, ids: &[EventId]) -> Result<Vec<Event>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("SELECT {} FROM events WHERE id = ANY($1)", EVENT_COLUMNS);
        let rows = sqlx::query_as::<_, EventRow>(&sql)
            .bind(ids)
            .fetch_all(self.db.pool())
            .await?;
        Ok(rows.into_iter().map(Event::from).collect())
    }

    #[instrument(skip(self))]
    async fn get_user_preferences(&self, user_id: UserId) -> Result<Option<UserPreferences>> {
        let row = sqlx::query_as::<_, PreferencesRow>(
            "SELECT categories, locations FROM user_preferences WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(self.db.pool())
        .await?;

        row.map(UserPreferences::try_from).transpose()
    }

    async fn get_liked_event_ids(&self, user_id: UserId) -> Result<Vec<EventId>> {
        self.fetch_ids("SELECT event_id FROM event_likes WHERE user_id = $1", user_id)
            .await
    }

    async fn get_saved_event_ids(&self, user_id: UserId) -> Result<Vec<EventId>> {
        self.fetch_ids("SELECT event_id FROM saved_events WHERE user_id = $1", user_id)
            .await
    }

    async fn get_bookings_for_user(&self, user_id: UserId) -> Result<Vec<Booking>> {
        let rows = sqlx::query_as::<_, (i64, String)>(
            "SELECT event_id, status FROM bookings WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|(event_id, status)| Booking {
                event_id,
                status: BookingStatus::from(status.as_str()),
            })
            .collect())
    }

    async fn get_followed_user_ids(&self, user_id: UserId) -> Result<Vec<UserId>> {
        self.fetch_ids(
            "SELECT following_id FROM follows WHERE follower_id = $1",
            user_id,
        )
        .await
    }
}
