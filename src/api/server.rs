//! Axum API server for riskmeter.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::meter::RiskMeter;

/// Request bodies above this size are rejected before parsing.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Shared state for all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub meter: Arc<RiskMeter>,
}

impl AppState {
    pub fn new(meter: RiskMeter) -> Self {
        Self {
            meter: Arc::new(meter),
        }
    }
}

/// Build the axum router with all API routes.
pub fn build_router(state: AppState) -> Router {
    let shared_state = Arc::new(state);

    // Any origin may call the API; the request origin is mirrored so that
    // credentialed requests remain valid.
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::ORIGIN, header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true);

    Router::new()
        .route("/ping", get(super::routes::ping::ping))
        .route("/health", get(super::routes::health::get_health))
        .route("/meter", post(super::routes::meter::rate))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(shared_state)
}

/// Start the API server and run until Ctrl-C.
pub async fn start_server(
    config: &ServerConfig,
    state: AppState,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let app = build_router(state);
    let addr = format!("{}:{}", config.bind, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("riskmeter listening on {addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("riskmeter stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl-C; running until killed");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MeterConfig;
    use crate::error::{MeterError, Result};
    use crate::meter::PromptSource;
    use crate::providers::{ChatOptions, LLMProvider, LLMResponse, Message};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use tower::util::ServiceExt;

    /// Provider returning a fixed text, or failing when `text` is `None`.
    struct FixedProvider {
        text: Option<&'static str>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LLMProvider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        fn default_model(&self) -> &str {
            "fixed-model"
        }

        async fn chat(
            &self,
            _messages: Vec<Message>,
            _model: Option<&str>,
            _options: ChatOptions,
        ) -> Result<LLMResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.text {
                Some(text) => Ok(LLMResponse::text(text)),
                None => Err(MeterError::Provider("upstream down".into())),
            }
        }
    }

    fn make_app(text: Option<&'static str>) -> (Router, Arc<FixedProvider>, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let prompt_path = dir.path().join("prompt.xml");
        std::fs::write(&prompt_path, "<prompt/>").unwrap();
        let provider = Arc::new(FixedProvider {
            text,
            calls: AtomicUsize::new(0),
        });
        let meter = RiskMeter::new(
            provider.clone(),
            PromptSource::new(prompt_path),
            &MeterConfig::default(),
        );
        (build_router(AppState::new(meter)), provider, dir)
    }

    fn post_meter(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/meter")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(resp: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_ping() {
        let (app, _, _dir) = make_app(None);
        let req = Request::builder().uri("/ping").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await, json!({ "message": "pong" }));
    }

    #[tokio::test]
    async fn test_meter_returns_verdict_and_caches() {
        let (app, provider, _dir) =
            make_app(Some(r#"{"indicator": 12, "comment": "calm", "review": "ok"}"#));

        let resp = app
            .clone()
            .oneshot(post_meter(r#"[{"title": "Calm seas"}]"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            body_json(resp).await,
            json!({ "indicator": 12, "comment": "calm", "review": "ok" })
        );

        let resp = app
            .clone()
            .oneshot(post_meter(r#"[{"title": "Anything"}]"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let health = body_json(app.oneshot(req).await.unwrap()).await;
        assert_eq!(health["status"], "ok");
        assert_eq!(health["cache"]["fresh"], true);
        assert_eq!(health["cache"]["hits"], 1);
    }

    #[tokio::test]
    async fn test_meter_empty_array_is_400() {
        let (app, provider, _dir) = make_app(Some("{}"));
        let resp = app.oneshot(post_meter("[]")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(resp).await,
            json!({ "error": "No articles provided" })
        );
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_meter_malformed_body_is_400() {
        let (app, _, _dir) = make_app(Some("{}"));
        let resp = app.oneshot(post_meter(r#"{"title": "not an array"}"#)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(resp).await,
            json!({ "error": "Invalid request body" })
        );
    }

    #[tokio::test]
    async fn test_meter_upstream_failure_is_200_fallback() {
        let (app, _, _dir) = make_app(None);
        let resp = app.oneshot(post_meter(r#"[{"title": "x"}]"#)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            body_json(resp).await,
            json!({ "indicator": 42, "comment": "An error occurred", "review": "" })
        );
    }

    #[tokio::test]
    async fn test_meter_missing_prompt_is_500() {
        let provider = Arc::new(FixedProvider {
            text: Some("{}"),
            calls: AtomicUsize::new(0),
        });
        let meter = RiskMeter::new(
            provider,
            PromptSource::new("/nonexistent/prompt.xml"),
            &MeterConfig::default(),
        );
        let app = build_router(AppState::new(meter));
        let resp = app.oneshot(post_meter(r#"[{"title": "x"}]"#)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_json(resp).await["error"].is_string());
    }

    #[tokio::test]
    async fn test_cors_preflight_mirrors_origin() {
        let (app, _, _dir) = make_app(None);
        let req = Request::builder()
            .method("OPTIONS")
            .uri("/meter")
            .header("origin", "https://dashboard.example")
            .header("access-control-request-method", "POST")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(
            resp.headers()
                .get("access-control-allow-origin")
                .and_then(|v| v.to_str().ok()),
            Some("https://dashboard.example")
        );
        assert_eq!(
            resp.headers()
                .get("access-control-allow-credentials")
                .and_then(|v| v.to_str().ok()),
            Some("true")
        );
    }
}
