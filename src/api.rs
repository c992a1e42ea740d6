//! HTTP API Server for event discovery
//!
//! Provides REST endpoints for the frontend to search events and fetch
//! personalized recommendations.

use axum::{
    extract::{Path, Query, Request, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tower::limit::ConcurrencyLimitLayer;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::models::{Event, UserId};
use crate::recommendation::{RankingStrategy, ScoredEvent};
use crate::search::{FilterCriteria, Pagination};
use crate::service::DiscoveryService;

/// Shared application state
pub struct AppState {
    pub service: DiscoveryService,
}

impl AppState {
    pub fn new(service: DiscoveryService) -> Arc<Self> {
        Arc::new(Self { service })
    }
}

/// Raw search query string. Values stay strings so malformed input gets our
/// own 400 body instead of the extractor's plain-text rejection.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub query: Option<String>,
    pub category_id: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub is_free: Option<String>,
    pub is_virtual: Option<String>,
    pub is_hybrid: Option<String>,
    pub max_price: Option<String>,
    pub offset: Option<String>,
    pub limit: Option<String>,
}

impl SearchQuery {
    pub fn criteria(&self) -> Result<FilterCriteria> {
        Ok(FilterCriteria {
            query: self.query.clone().filter(|q| !q.is_empty()),
            category_id: parse_opt(&self.category_id, "categoryId", parse_number)?,
            start_date: parse_opt(&self.start_date, "startDate", parse_date)?,
            end_date: parse_opt(&self.end_date, "endDate", parse_date)?,
            is_free: parse_opt(&self.is_free, "isFree", parse_bool)?,
            is_virtual: parse_opt(&self.is_virtual, "isVirtual", parse_bool)?,
            is_hybrid: parse_opt(&self.is_hybrid, "isHybrid", parse_bool)?,
            max_price: parse_opt(&self.max_price, "maxPrice", parse_price)?,
        })
    }

    pub fn pagination(&self) -> Result<Pagination> {
        Ok(Pagination {
            offset: parse_opt(&self.offset, "offset", parse_number)?.unwrap_or(0),
            limit: parse_opt(&self.limit, "limit", parse_number)?,
        })
    }
}

/// Query params for recommendation endpoints
#[derive(Debug, Default, Deserialize)]
pub struct RecommendationsQuery {
    pub limit: Option<String>,
}

/// Response for the explain endpoint
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplainResponse {
    pub user_id: UserId,
    pub strategy: RankingStrategy,
    pub candidates_considered: usize,
    pub items: Vec<ScoredEvent>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub store: String,
}

/// Build the router with the middleware stack
pub fn build_router(state: Arc<AppState>, config: &ApiConfig) -> Router {
    let mut app = Router::new()
        // Health check
        .route("/health", get(health_check))
        // Search
        .route("/api/v1/events/search", get(search_events))
        // Recommendations
        .route(
            "/api/v1/users/:user_id/recommended-events",
            get(get_recommendations),
        )
        .route(
            "/api/v1/users/:user_id/recommended-events/explain",
            get(explain_recommendations),
        )
        .with_state(state);

    if config.cors_enabled {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    let middleware = ServiceBuilder::new()
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id
                )
            }),
        )
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TimeoutLayer::new(config.request_timeout))
        .layer(ConcurrencyLimitLayer::new(config.max_concurrent_requests));

    app.layer(middleware)
}

/// Start the API server, stopping when `shutdown` resolves
pub async fn start_server(
    state: Arc<AppState>,
    config: &ApiConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let app = build_router(state, config);

    let addr = format!("{}:{}", config.host, config.port);
    info!("🚀 Starting discovery API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("API server stopped");
    Ok(())
}

/// Health check endpoint
async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let store = state.service.store();
    let (status_code, status) = match store.health_check().await {
        Ok(()) => (StatusCode::OK, "healthy"),
        Err(e) => {
            warn!("Store health check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "degraded")
        }
    };

    (
        status_code,
        Json(HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            store: store.backend_name().to_string(),
        }),
    )
}

/// Search public events
async fn search_events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<Event>>> {
    let criteria = query.criteria()?;
    let page = query.pagination()?;
    let events = state.service.search(&criteria, page).await?;
    Ok(Json(events))
}

/// Get personalized recommendations for a user
async fn get_recommendations(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(query): Query<RecommendationsQuery>,
) -> Result<Json<Vec<Event>>> {
    let user_id = parse_user_id(&user_id)?;
    let limit = parse_opt(&query.limit, "limit", parse_number)?;
    let events = state.service.recommend(user_id, limit).await?;
    Ok(Json(events))
}

/// Recommendations with scores and matched signals (for debugging/admin)
async fn explain_recommendations(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(query): Query<RecommendationsQuery>,
) -> Result<Json<ExplainResponse>> {
    let user_id = parse_user_id(&user_id)?;
    let limit = parse_opt(&query.limit, "limit", parse_number)?;
    let ranking = state.service.explain(user_id, limit).await?;
    Ok(Json(ExplainResponse {
        user_id,
        strategy: ranking.strategy,
        candidates_considered: ranking.candidates_considered,
        items: ranking.items,
    }))
}

// ============================================================================
// Query parsing
// ============================================================================

/// Parse an optional query value. Empty strings count as absent.
fn parse_opt<T>(
    raw: &Option<String>,
    param: &'static str,
    parse: impl Fn(&str) -> std::result::Result<T, String>,
) -> Result<Option<T>> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => parse(value)
            .map(Some)
            .map_err(|message| Error::invalid_parameter(param, message)),
    }
}

fn parse_user_id(raw: &str) -> Result<UserId> {
    parse_number(raw).map_err(|message| Error::invalid_parameter("user_id", message))
}

fn parse_number<T>(value: &str) -> std::result::Result<T, String>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| format!("'{}' is not a valid number: {}", value, e))
}

fn parse_price(value: &str) -> std::result::Result<f64, String> {
    let price: f64 = parse_number(value)?;
    if price.is_finite() {
        Ok(price)
    } else {
        Err(format!("'{}' is not a finite price", value))
    }
}

fn parse_bool(value: &str) -> std::result::Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(format!("'{}' is not a boolean", value)),
    }
}

/// RFC 3339 timestamp, or a bare `YYYY-MM-DD` read as midnight UTC
fn parse_date(value: &str) -> std::result::Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| format!("'{}' is not an RFC 3339 timestamp or YYYY-MM-DD date", value))
}
