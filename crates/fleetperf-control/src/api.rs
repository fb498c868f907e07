//! HTTP ingestion API.
//!
//! Mounted under `/api` by the binary:
//! - `POST /api/speedtest` — agents push one result per test run
//! - `GET  /api/health`    — liveness plus stored-record count
//! - `GET  /api/recent?n=` — most recent accepted records
//! - `GET  /api/last`      — the single newest record, `{}` if none
//!
//! A malformed body or a keyless report is the agent's fault and gets a
//! 400; the campaign keeps running either way.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::collector::RawReport;
use crate::state::AppState;

/// Build the `/api` router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/speedtest", post(post_speedtest))
        .route("/health", get(get_health))
        .route("/recent", get(get_recent))
        .route("/last", get(get_last))
}

/// Handler for `POST /api/speedtest`.
async fn post_speedtest(
    State(state): State<AppState>,
    body: Result<Json<RawReport>, JsonRejection>,
) -> impl IntoResponse {
    let Json(raw) = match body {
        Ok(body) => body,
        Err(rejection) => {
            tracing::warn!(error = %rejection, "rejected malformed report body");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "stored": false, "error": rejection.body_text() })),
            );
        }
    };

    match state.collector().post(&raw) {
        Ok(report) => (
            StatusCode::OK,
            Json(json!({ "stored": true, "key": report.source_key })),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "rejected report");
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "stored": false, "error": e.to_string() })),
            )
        }
    }
}

/// Handler for `GET /api/health`. `count` is the size of the bounded
/// recent store, not a lifetime total.
async fn get_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "ok": true,
        "run_id": state.run_id(),
        "ts": chrono::Utc::now().timestamp(),
        "started_at": state.started_at().to_rfc3339(),
        "uptime_s": state.collector().uptime_s(),
        "count": state.collector().recent_len(),
    }))
}

#[derive(Debug, Deserialize)]
struct RecentParams {
    #[serde(default = "default_recent_n")]
    n: usize,
}

fn default_recent_n() -> usize {
    20
}

/// Handler for `GET /api/recent?n=`.
async fn get_recent(
    State(state): State<AppState>,
    Query(params): Query<RecentParams>,
) -> impl IntoResponse {
    Json(state.collector().recent(params.n))
}

/// Handler for `GET /api/last`.
async fn get_last(State(state): State<AppState>) -> impl IntoResponse {
    let last = state
        .collector()
        .last()
        .and_then(|report| serde_json::to_value(report).ok())
        .unwrap_or_else(|| json!({}));
    Json(last)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::collector::Collector;

    use super::*;

    fn test_app() -> (Router, Arc<Collector>) {
        let collector = Arc::new(Collector::new(None));
        let state = AppState::new(collector.clone(), "run_test".into());
        (router().with_state(state), collector)
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn speedtest_post_stores_report() {
        let (app, collector) = test_app();

        let req = post_json(
            "/speedtest",
            r#"{"ip": "10.0.0.7", "download_mbps": "55.2 Mbps", "upload_mbps": 12.1}"#,
        );
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["stored"], true);
        assert_eq!(body["key"], "10.0.0.7");
        assert_eq!(collector.get("10.0.0.7").unwrap().download, "55.2 Mbps");
    }

    #[tokio::test]
    async fn speedtest_keyless_report_is_400() {
        let (app, collector) = test_app();

        let req = post_json("/speedtest", r#"{"download_mbps": "55.2"}"#);
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["stored"], false);
        assert_eq!(collector.count(), 0);
    }

    #[tokio::test]
    async fn speedtest_malformed_body_is_400() {
        let (app, _) = test_app();

        let req = post_json("/speedtest", "not json at all");
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["stored"], false);
    }

    #[tokio::test]
    async fn health_reports_stored_count() {
        let (app, collector) = test_app();
        collector
            .post(&crate::collector::RawReport {
                ip: Some(serde_json::Value::String("10.0.0.1".into())),
                ..Default::default()
            })
            .unwrap();

        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["ok"], true);
        assert_eq!(body["run_id"], "run_test");
        assert_eq!(body["count"], 1);
        assert!(body["started_at"].is_string());
    }

    #[tokio::test]
    async fn last_is_empty_object_then_newest_record() {
        let (app, collector) = test_app();

        let req = Request::builder().uri("/last").body(Body::empty()).unwrap();
        let response = app.clone().oneshot(req).await.unwrap();
        assert_eq!(body_json(response).await, serde_json::json!({}));

        collector.post(&raw_post("10.0.0.1", "11")).unwrap();
        collector.post(&raw_post("10.0.0.2", "22")).unwrap();

        let req = Request::builder().uri("/last").body(Body::empty()).unwrap();
        let response = app.oneshot(req).await.unwrap();
        let body = body_json(response).await;
        assert_eq!(body["source_key"], "10.0.0.2");
        assert_eq!(body["download"], "22");
    }

    fn raw_post(ip: &str, download: &str) -> crate::collector::RawReport {
        crate::collector::RawReport {
            ip: Some(serde_json::Value::String(ip.into())),
            download_mbps: Some(serde_json::Value::String(download.into())),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn recent_defaults_to_twenty() {
        let (app, collector) = test_app();
        for i in 0..30 {
            collector
                .post(&crate::collector::RawReport {
                    ip: Some(serde_json::Value::String(format!("10.0.1.{i}"))),
                    ..Default::default()
                })
                .unwrap();
        }

        let req = Request::builder()
            .uri("/recent")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        let body = body_json(response).await;
        assert_eq!(body.as_array().unwrap().len(), 20);

        let app = router().with_state(AppState::new(collector, "run_test".into()));
        let req = Request::builder()
            .uri("/recent?n=5")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        let body = body_json(response).await;
        assert_eq!(body.as_array().unwrap().len(), 5);
    }
}
