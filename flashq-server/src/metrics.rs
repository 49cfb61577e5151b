//! In-process counters
//!
//! Core events bump atomic counters; the HTTP layer records one entry per
//! response keyed by matched route and status. `GET /api/metrics` serves a
//! snapshot.

use axum::extract::{MatchedPath, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
pub struct Metrics {
    sessions_created: AtomicU64,
    answers_updated: AtomicU64,
    recommendations_generated: AtomicU64,
    responses: Mutex<BTreeMap<(String, u16), u64>>,
}

/// Point-in-time copy of all counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub sessions_created: u64,
    pub answers_updated: u64,
    pub recommendations_generated: u64,
    pub responses: Vec<ResponseCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponseCount {
    pub route: String,
    pub status: u16,
    pub count: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_created(&self) {
        self.sessions_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn answer_updated(&self) {
        self.answers_updated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn recommendation_generated(&self) {
        self.recommendations_generated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_response(&self, route: &str, status: u16) {
        let mut responses = self.responses.lock().unwrap_or_else(|e| e.into_inner());
        *responses.entry((route.to_string(), status)).or_insert(0) += 1;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let responses = self
            .responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|((route, status), count)| ResponseCount {
                route: route.clone(),
                status: *status,
                count: *count,
            })
            .collect();

        MetricsSnapshot {
            sessions_created: self.sessions_created.load(Ordering::Relaxed),
            answers_updated: self.answers_updated.load(Ordering::Relaxed),
            recommendations_generated: self.recommendations_generated.load(Ordering::Relaxed),
            responses,
        }
    }
}

/// Middleware counting responses by matched route
///
/// Unmatched requests are grouped under `<unmatched>` so arbitrary paths
/// cannot grow the map.
pub async fn track_responses(
    State(metrics): State<Arc<Metrics>>,
    request: Request,
    next: Next,
) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "<unmatched>".to_string());

    let response = next.run(request).await;
    metrics.record_response(&route, response.status().as_u16());
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let metrics = Metrics::new();
        metrics.session_created();
        metrics.answer_updated();
        metrics.answer_updated();
        metrics.record_response("/api/test-sessions", 200);
        metrics.record_response("/api/test-sessions", 200);
        metrics.record_response("/api/test-sessions", 404);

        let snapshot = metrics.snapshot();

        assert_eq!(snapshot.sessions_created, 1);
        assert_eq!(snapshot.answers_updated, 2);
        assert_eq!(snapshot.recommendations_generated, 0);
        assert_eq!(
            snapshot.responses,
            vec![
                ResponseCount {
                    route: "/api/test-sessions".to_string(),
                    status: 200,
                    count: 2
                },
                ResponseCount {
                    route: "/api/test-sessions".to_string(),
                    status: 404,
                    count: 1
                },
            ]
        );
    }
}
