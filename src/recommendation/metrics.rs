//! Recommendation Metrics and Performance Monitoring
//!
//! Per-request bookkeeping for the recommendation path. Each request produces
//! one `RecommendationMetrics` value which is logged and pushed to the
//! `metrics` facade (exported to Prometheus when the `metrics` feature is on).

use serde::Serialize;
use std::collections::HashMap;
use std::time::Instant;

use super::engine::{Ranking, RankingStrategy, Signal};
use crate::models::UserId;

/// Metrics for a single recommendation request
#[derive(Debug, Clone, Serialize)]
pub struct RecommendationMetrics {
    pub user_id: UserId,
    pub request_id: String,
    pub timestamp: i64,

    // Performance
    pub total_duration_ms: u64,
    pub fetch_duration_ms: u64,
    pub scoring_duration_ms: u64,

    // Quality
    pub strategy: RankingStrategy,
    pub candidates_considered: usize,
    pub recommendations_returned: usize,
    pub avg_score: f64,
    /// Returned events with at least one signal other than popularity
    pub personalized_returned: usize,
    /// signal name -> number of returned events carrying it
    pub signal_counts: HashMap<&'static str, usize>,
}

impl RecommendationMetrics {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            request_id: uuid::Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now().timestamp(),
            total_duration_ms: 0,
            fetch_duration_ms: 0,
            scoring_duration_ms: 0,
            strategy: RankingStrategy::Personalized,
            candidates_considered: 0,
            recommendations_returned: 0,
            avg_score: 0.0,
            personalized_returned: 0,
            signal_counts: HashMap::new(),
        }
    }

    /// Fill the quality fields from a finished ranking
    pub fn observe_ranking(&mut self, ranking: &Ranking) {
        self.strategy = ranking.strategy;
        self.candidates_considered = ranking.candidates_considered;
        self.recommendations_returned = ranking.items.len();

        let total: f64 = ranking.items.iter().map(|s| s.score).sum();
        self.avg_score = total / ranking.items.len().max(1) as f64;

        self.personalized_returned = ranking
            .items
            .iter()
            .filter(|item| item.signals.iter().any(|s| *s != Signal::Popularity))
            .count();

        self.signal_counts.clear();
        for item in &ranking.items {
            for signal in &item.signals {
                *self.signal_counts.entry(signal_name(signal)).or_insert(0) += 1;
            }
        }
    }

    /// Push to the metrics recorder and log the summary
    pub fn record(&self, slow_threshold_ms: u64) {
        let strategy = self.strategy.as_str();

        metrics::counter!("recommendation_requests_total", "strategy" => strategy).increment(1);
        metrics::histogram!("recommendation_duration_ms").record(self.total_duration_ms as f64);
        metrics::histogram!("recommendation_fetch_duration_ms")
            .record(self.fetch_duration_ms as f64);
        metrics::histogram!("recommendation_candidates").record(self.candidates_considered as f64);
        for (signal, count) in &self.signal_counts {
            metrics::counter!("recommendation_signals_total", "signal" => *signal)
                .increment(*count as u64);
        }

        tracing::debug!(
            request_id = %self.request_id,
            user_id = self.user_id,
            strategy,
            candidates = self.candidates_considered,
            returned = self.recommendations_returned,
            avg_score = self.avg_score,
            total_ms = self.total_duration_ms,
            fetch_ms = self.fetch_duration_ms,
            scoring_ms = self.scoring_duration_ms,
            "Recommendation request completed"
        );

        for issue in QualityAnalyzer::detect_issues(self, slow_threshold_ms) {
            tracing::warn!(request_id = %self.request_id, user_id = self.user_id, "⚠️ {}", issue);
        }
    }
}

fn signal_name(signal: &Signal) -> &'static str {
    match signal {
        Signal::DeclaredCategory => "declared_category",
        Signal::InteractionCategory => "interaction_category",
        Signal::PreferredLocation { .. } => "preferred_location",
        Signal::VirtualAffinity => "virtual_affinity",
        Signal::FollowedCreator => "followed_creator",
        Signal::Popularity => "popularity",
    }
}

/// Performance timer for tracking operation duration
pub struct PerformanceTimer {
    start: Instant,
    label: String,
}

impl PerformanceTimer {
    pub fn new(label: &str) -> Self {
        Self {
            start: Instant::now(),
            label: label.to_string(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Drop for PerformanceTimer {
    fn drop(&mut self) {
        let elapsed = self.elapsed_ms();
        tracing::debug!("⏱️ {} completed in {}ms", self.label, elapsed);
    }
}

/// Flags requests worth a look in the logs
pub struct QualityAnalyzer;

impl QualityAnalyzer {
    /// Share of returned events that carry at least one personal signal
    pub fn personalization_ratio(metrics: &RecommendationMetrics) -> f64 {
        if metrics.recommendations_returned == 0 {
            return 0.0;
        }
        metrics.personalized_returned as f64 / metrics.recommendations_returned as f64
    }

    pub fn detect_issues(metrics: &RecommendationMetrics, slow_threshold_ms: u64) -> Vec<String> {
        let mut issues = Vec::new();

        if metrics.total_duration_ms > slow_threshold_ms {
            issues.push(format!("Slow response: {}ms", metrics.total_duration_ms));
        }

        if metrics.candidates_considered == 0 {
            issues.push("No upcoming public events to recommend".to_string());
        }

        if metrics.strategy == RankingStrategy::Personalized
            && metrics.recommendations_returned > 0
            && Self::personalization_ratio(metrics) == 0.0
        {
            issues.push("Personalized ranking matched no personal signal".to_string());
        }

        issues
    }
}
