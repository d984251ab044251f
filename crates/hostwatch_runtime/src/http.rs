use axum::{
    extract::{Query, State, WebSocketUpgrade},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use telemetry::AgentGauges;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::broadcast::BroadcastHub;
use crate::cache::LatestStateCache;
use crate::errors::HostwatchError;
use crate::query::{HistoricalQuery, QueryService};
use crate::types::{Measurement, Sample, SourceKey};

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Query parameters for the history endpoint
#[derive(Debug, Default, Deserialize)]
pub struct MetricsParams {
    pub source_id: Option<String>,
    /// Dashboard spelling of `source_id`
    pub server_id: Option<String>,
    pub tag: Option<String>,
    /// Kept as text so a malformed value falls back to the default limit
    pub limit: Option<String>,
}

impl From<MetricsParams> for HistoricalQuery {
    fn from(params: MetricsParams) -> Self {
        HistoricalQuery {
            source_id: params.source_id.or(params.server_id).unwrap_or_default(),
            tag: params.tag.unwrap_or_default(),
            limit: params.limit.and_then(|raw| raw.trim().parse().ok()),
        }
    }
}

/// Shared handler state
pub struct HttpState {
    pub query: QueryService,
    pub cache: Arc<LatestStateCache>,
    pub hub: Arc<BroadcastHub>,
    pub gauges: Arc<AgentGauges>,
    pub web_dir: Option<PathBuf>,
}

/// Read surface: history, sources, latest values, gauges, health and the
/// live-view upgrade. Unrouted paths fall through to the dashboard assets
/// when `web_dir` is set.
pub fn create_router(state: Arc<HttpState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let mut router = Router::new()
        .route("/api/metrics", get(handle_metrics))
        .route("/api/list_servers", get(handle_list_servers))
        .route("/api/latest", get(handle_latest))
        .route("/metrics", get(handle_prometheus))
        .route("/health", get(handle_health))
        .route("/ws", get(handle_ws));

    if let Some(dir) = &state.web_dir {
        router = router.fallback_service(ServeDir::new(dir));
    }

    router
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn db_error(err: HostwatchError) -> (StatusCode, String) {
    error!("Read query failed: {}", err);
    (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {}", err))
}

async fn handle_metrics(
    Query(params): Query<MetricsParams>,
    State(state): State<Arc<HttpState>>,
) -> Result<Json<Vec<Measurement>>, (StatusCode, String)> {
    state
        .query
        .list_historical(params.into())
        .await
        .map(Json)
        .map_err(db_error)
}

async fn handle_list_servers(
    State(state): State<Arc<HttpState>>,
) -> Result<Json<Vec<SourceKey>>, (StatusCode, String)> {
    state.query.list_sources().await.map(Json).map_err(db_error)
}

async fn handle_latest(State(state): State<Arc<HttpState>>) -> Json<Vec<Sample>> {
    Json(state.cache.snapshot())
}

async fn handle_prometheus(State(state): State<Arc<HttpState>>) -> Response {
    match state.gauges.render() {
        Ok(body) => ([(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            error!("Failed to encode gauges: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn handle_health(State(state): State<Arc<HttpState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "viewers": state.hub.viewer_count(),
        "cached_sources": state.cache.len(),
        "gauge_series": state.gauges.series_count(),
    }))
}

async fn handle_ws(ws: WebSocketUpgrade, State(state): State<Arc<HttpState>>) -> Response {
    let hub = Arc::clone(&state.hub);
    ws.on_upgrade(move |socket| hub.serve_socket(socket))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::tests::UnavailableStore;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    fn state_with_failing_store() -> Arc<HttpState> {
        state_serving(None)
    }

    fn state_serving(web_dir: Option<PathBuf>) -> Arc<HttpState> {
        Arc::new(HttpState {
            query: QueryService::new(Arc::new(UnavailableStore)),
            cache: Arc::new(LatestStateCache::new()),
            hub: Arc::new(BroadcastHub::new(Duration::from_secs(1))),
            gauges: Arc::new(AgentGauges::new().unwrap()),
            web_dir,
        })
    }

    async fn fetch(app: Router, uri: &str) -> Response {
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_params_accept_alias_and_bad_limit() {
        let query = HistoricalQuery::from(MetricsParams {
            server_id: Some("h1".to_string()),
            limit: Some("lots".to_string()),
            ..Default::default()
        });
        assert_eq!(query.source_id, "h1");
        assert_eq!(query.limit, None);

        let query = HistoricalQuery::from(MetricsParams {
            source_id: Some("h2".to_string()),
            server_id: Some("h1".to_string()),
            tag: Some("prod".to_string()),
            limit: Some("10".to_string()),
        });
        assert_eq!(query.source_id, "h2");
        assert_eq!(query.tag, "prod");
        assert_eq!(query.limit, Some(10));
    }

    #[tokio::test]
    async fn test_store_failure_is_500() {
        let app = create_router(state_with_failing_store());
        let response = fetch(app, "/api/metrics?source_id=h1").await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_text(response).await.starts_with("DB error:"));
    }

    #[tokio::test]
    async fn test_health_and_latest_read_memory_state() {
        let state = state_with_failing_store();
        state.cache.upsert(Sample::new("h1", "prod").with_usage(1.0, 2.0, 3.0, 4.0));
        let app = create_router(Arc::clone(&state));

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let health: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(health["status"], "ok");
        assert_eq!(health["viewers"], 0);
        assert_eq!(health["cached_sources"], 1);

        let response = app
            .oneshot(Request::builder().uri("/api/latest").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let latest: Vec<Sample> = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(latest, vec![Sample::new("h1", "prod").with_usage(1.0, 2.0, 3.0, 4.0)]);
    }

    #[tokio::test]
    async fn test_prometheus_exposition() {
        let state = state_with_failing_store();
        state.gauges.record("h1", "prod", 42.5, 72.2, 33.1, 4096.0);
        let app = create_router(state);

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], PROMETHEUS_CONTENT_TYPE);
        let text = body_text(response).await;
        assert!(text.contains("agent_cpu_usage{server_id=\"h1\",tag=\"prod\"} 42.5"));
    }

    #[tokio::test]
    async fn test_cors_allows_any_origin() {
        let app = create_router(state_with_failing_store());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header(header::ORIGIN, "http://dashboard.local")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[tokio::test]
    async fn test_dashboard_assets_served_from_web_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>hostwatch</h1>").unwrap();
        std::fs::write(dir.path().join("app.js"), "console.log('live');").unwrap();
        let app = create_router(state_serving(Some(dir.path().to_path_buf())));

        let response = fetch(app.clone(), "/app.js").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "console.log('live');");

        let response = fetch(app.clone(), "/").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "<h1>hostwatch</h1>");

        // API routes still win over files
        let response = fetch(app.clone(), "/health").await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = fetch(app, "/missing.css").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_no_web_dir_means_no_assets() {
        let response = fetch(create_router(state_with_failing_store()), "/index.html").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
