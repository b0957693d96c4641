//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application: the
//! rate-limited `/api` routes and the OpenAPI document.

use crate::{
    handlers,
    models::{
        AuthUrlResponse, ErrorResponse, GoogleStatus, OkResponse, SessionInfo,
        StartAgentPayload, StartAgentResponse, StopAgentPayload,
    },
    rate_limit::limit_requests,
    state::AppState,
};

use axum::{
    Json, Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::warn;
use utoipa::OpenApi;
use workky_core::{
    agent_log::{AgentLogEvent, AgentLogPayload},
    business::{BookingRules, BusinessConfig, BusinessInfo, DayHours, Pricing, Service},
};

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::create_session,
        handlers::start_agent,
        handlers::stop_agent,
        handlers::save_business,
        handlers::load_business,
        handlers::google_auth_url,
        handlers::google_callback,
        handlers::google_status,
        handlers::post_agent_log,
        handlers::agent_events,
        handlers::llm_proxy,
    ),
    components(
        schemas(
            SessionInfo, StartAgentPayload, StartAgentResponse, StopAgentPayload, OkResponse,
            AuthUrlResponse, GoogleStatus, ErrorResponse, AgentLogPayload, AgentLogEvent,
            BusinessConfig, BusinessInfo, Service, DayHours, BookingRules, Pricing
        )
    ),
    tags(
        (name = "Workky API", description = "Voice receptionist backend: agent lifecycle, business setup and calendar linking")
    )
)]
pub struct ApiDoc;

/// CORS restricted to the configured browser origins.
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    // Every `/api` route shares the per-IP rate limit.
    let api_router = Router::new()
        .route("/session", post(handlers::create_session))
        .route("/start-agent", post(handlers::start_agent))
        .route("/stop-agent", post(handlers::stop_agent))
        .route("/business/save", post(handlers::save_business))
        .route("/business/load", get(handlers::load_business))
        .route("/google/auth-url", get(handlers::google_auth_url))
        .route("/google/callback", get(handlers::google_callback))
        .route("/google/status", get(handlers::google_status))
        .route("/agent-log", post(handlers::post_agent_log))
        .route("/agent-events", get(handlers::agent_events))
        .route("/llm/chat/completions", post(handlers::llm_proxy))
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            limit_requests,
        ))
        .with_state(app_state.clone());

    Router::new()
        .route(
            "/api-docs/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        )
        .nest("/api", api_router)
        .layer(cors_layer(&app_state.config.allowed_origins))
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        agent::{
            AgentManager, AgentSettings,
            vendor::{MockAgentVendor, VendorError},
        },
        config::{Config, TtsConfig},
        events::EventRelay,
        oauth_state::OAuthStates,
        rate_limit::RateLimiter,
    };
    use axum::{
        body::{Body, to_bytes},
        extract::connect_info::MockConnectInfo,
        http::{Request, StatusCode},
    };
    use secrecy::SecretString;
    use serde_json::{Value, json};
    use std::{net::SocketAddr, path::Path, time::Duration};
    use tower::ServiceExt;
    use workky_core::{
        google::{GoogleOAuthClient, GoogleOAuthConfig},
        storage::{BusinessStore, TokenStore},
    };

    fn test_config(data_dir: &Path, rate_limit_per_minute: u32) -> Config {
        Config {
            bind_address: "127.0.0.1:0".parse().unwrap(),
            agora_app_id: "app-123".to_string(),
            agora_app_token: None,
            agora_customer_id: "customer".to_string(),
            agora_customer_secret: SecretString::from("secret".to_string()),
            agora_api_base: "http://127.0.0.1:9".to_string(),
            agent_rtc_uid: "0".to_string(),
            custom_llm_url: "https://llm.example.com/chat/completions".to_string(),
            custom_llm_api_key: None,
            llm_model: "test-model".to_string(),
            llm_internal_url: "http://127.0.0.1:9/chat/completions".to_string(),
            tts: TtsConfig {
                vendor: "microsoft".to_string(),
                api_key: None,
                region: "eastus".to_string(),
                voice: "voice".to_string(),
            },
            asr_language: "en-US".to_string(),
            agent_idle_timeout_secs: 120,
            agent_retry_delay: Duration::ZERO,
            data_dir: data_dir.to_path_buf(),
            utc_offset: chrono::FixedOffset::east_opt(2 * 3600).unwrap(),
            allowed_origins: vec!["http://localhost:5000".to_string()],
            rate_limit_per_minute,
            google_oauth: None,
            log_level: tracing::Level::INFO,
        }
    }

    fn app_with(
        vendor: MockAgentVendor,
        data_dir: &Path,
        rate_limit_per_minute: u32,
        google: Option<GoogleOAuthClient>,
    ) -> Router {
        let config = test_config(data_dir, rate_limit_per_minute);
        let state = Arc::new(AppState {
            agents: AgentManager::new(
                Arc::new(vendor),
                BusinessStore::in_dir(data_dir),
                AgentSettings::from(&config),
            ),
            events: EventRelay::new(),
            business: BusinessStore::in_dir(data_dir),
            tokens: TokenStore::in_dir(data_dir),
            google,
            oauth_states: OAuthStates::default(),
            rate_limiter: RateLimiter::per_minute(config.rate_limit_per_minute),
            http_client: reqwest::Client::new(),
            config: Arc::new(config),
        });
        create_router(state).layer(MockConnectInfo(SocketAddr::from(([10, 0, 0, 1], 4000))))
    }

    fn app(vendor: MockAgentVendor, data_dir: &Path) -> Router {
        app_with(vendor, data_dir, 100, None)
    }

    fn google() -> GoogleOAuthClient {
        GoogleOAuthClient::new(
            GoogleOAuthConfig {
                client_id: "gid".to_string(),
                client_secret: SecretString::from("gsecret".to_string()),
                redirect_uri: "http://localhost:5000/api/google/callback".to_string(),
            },
            reqwest::Client::new(),
        )
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_session_returns_app_id_and_null_token() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(MockAgentVendor::new(), dir.path())
            .oneshot(post_json("/api/session", json!({})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            json!({"appId": "app-123", "token": null})
        );
    }

    #[tokio::test]
    async fn test_business_load_is_null_then_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(MockAgentVendor::new(), dir.path());

        let response = app.clone().oneshot(get("/api/business/load")).await.unwrap();
        assert_eq!(json_body(response).await, Value::Null);

        let config = json!({
            "businessInfo": {"name": "Bella Salon"},
            "services": [{"name": "Cut", "duration": "45", "price": "30"}],
            "bookingRules": {"minNotice": "2"}
        });
        let response = app
            .clone()
            .oneshot(post_json("/api/business/save", config))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({"ok": true}));

        let loaded = json_body(app.oneshot(get("/api/business/load")).await.unwrap()).await;
        assert_eq!(loaded["businessInfo"]["name"], "Bella Salon");
        assert_eq!(loaded["services"][0]["duration"], 45);
        assert_eq!(loaded["bookingRules"]["minNotice"], 2);
        assert_eq!(loaded["bookingRules"]["maxAdvance"], 30);
    }

    #[tokio::test]
    async fn test_business_save_rejects_invalid_body() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(MockAgentVendor::new(), dir.path())
            .oneshot(post_json("/api/business/save", json!({"services": "lots"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn test_start_agent_validation_error_is_400() {
        let dir = tempfile::tempdir().unwrap();
        let mut vendor = MockAgentVendor::new();
        vendor.expect_join().never();

        let response = app(vendor, dir.path())
            .oneshot(post_json(
                "/api/start-agent",
                json!({"channel": "x".repeat(65), "uid": 1}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(response).await["error"]
            .as_str()
            .unwrap()
            .contains("64"));
    }

    #[tokio::test]
    async fn test_start_agent_success_and_held_channel() {
        let dir = tempfile::tempdir().unwrap();
        let mut vendor = MockAgentVendor::new();
        vendor
            .expect_join()
            .times(1)
            .returning(|_| Ok("AGENT1".to_string()));
        let app = app(vendor, dir.path());

        let response = app
            .clone()
            .oneshot(post_json("/api/start-agent", json!({"channel": "room", "uid": 7})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({"agent_id": "AGENT1"}));

        let response = app
            .oneshot(post_json("/api/start-agent", json!({"channel": "room", "uid": 8})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(json_body(response).await["agent_id"], "AGENT1");
    }

    #[tokio::test]
    async fn test_vendor_failure_status_is_surfaced_without_detail() {
        let dir = tempfile::tempdir().unwrap();
        let mut vendor = MockAgentVendor::new();
        vendor.expect_join().returning(|_| {
            Err(VendorError::Status {
                status: 403,
                body: "invalid customer secret".to_string(),
            })
        });

        let response = app(vendor, dir.path())
            .oneshot(post_json("/api/start-agent", json!({"channel": "room", "uid": "7"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = json_body(response).await;
        assert_eq!(body["error"], "Failed to start agent");
    }

    #[tokio::test]
    async fn test_stop_agent_ok() {
        let dir = tempfile::tempdir().unwrap();
        let mut vendor = MockAgentVendor::new();
        vendor.expect_leave().times(1).returning(|_| Ok(()));

        let response = app(vendor, dir.path())
            .oneshot(post_json("/api/stop-agent", json!({"agentId": "AGENT1"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_rate_limit_returns_429_after_limit() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_with(MockAgentVendor::new(), dir.path(), 2, None);

        for _ in 0..2 {
            let response = app.clone().oneshot(get("/api/google/status")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        let response = app.clone().oneshot(get("/api/google/status")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(json_body(response).await["error"].is_string());

        let response = app.oneshot(get("/api-docs/openapi.json")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_google_endpoints_unavailable_without_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(MockAgentVendor::new(), dir.path());

        let response = app.clone().oneshot(get("/api/google/auth-url")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = app.oneshot(get("/api/google/status")).await.unwrap();
        assert_eq!(
            json_body(response).await,
            json!({"connected": false, "email": null})
        );
    }

    #[tokio::test]
    async fn test_google_callback_redirects() {
        let dir = tempfile::tempdir().unwrap();
        let app = app_with(MockAgentVendor::new(), dir.path(), 100, Some(google()));

        let response = app
            .clone()
            .oneshot(get("/api/google/callback?error=access_denied"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers()[header::LOCATION],
            "/?google_error=access_denied"
        );

        let response = app
            .clone()
            .oneshot(get("/api/google/callback?code=abc&state=forged"))
            .await
            .unwrap();
        assert_eq!(
            response.headers()[header::LOCATION],
            "/?google_error=invalid_state"
        );

        let response = app.oneshot(get("/api/google/auth-url")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        let url = body["url"].as_str().unwrap();
        let state = body["state"].as_str().unwrap();
        assert!(url.starts_with("https://accounts.google.com/"));
        assert!(url.contains(state));
    }

    #[tokio::test]
    async fn test_agent_log_is_relayed_to_subscribers() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(MockAgentVendor::new(), dir.path());

        let response = app
            .clone()
            .oneshot(post_json(
                "/api/agent-log",
                json!({"type": "tool_start", "tool": "check_availability", "label": "📅 Checking", "args": {"date": "2025-03-10"}}),
            ))
            .await
            .unwrap();
        assert_eq!(json_body(response).await, json!({"ok": true}));

        let response = app.oneshot(get("/api/agent-events")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/event-stream"
        );

        let mut body = response.into_body().into_data_stream();
        let chunk = tokio::time::timeout(Duration::from_secs(1), futures::StreamExt::next(&mut body))
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let text = String::from_utf8(chunk.to_vec()).unwrap();
        let data = text.trim().strip_prefix("data: ").unwrap();
        let event: Value = serde_json::from_str(data).unwrap();
        assert_eq!(event["type"], "tool_start");
        assert_eq!(event["args"]["date"], "2025-03-10");
        assert!(event["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_llm_proxy_unreachable_is_502() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(MockAgentVendor::new(), dir.path())
            .oneshot(post_json("/api/llm/chat/completions", json!({"stream": true})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_cors_allows_only_configured_origin() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(MockAgentVendor::new(), dir.path());

        let allowed = Request::builder()
            .uri("/api/google/status")
            .header(header::ORIGIN, "http://localhost:5000")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(allowed).await.unwrap();
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://localhost:5000"
        );

        let denied = Request::builder()
            .uri("/api/google/status")
            .header(header::ORIGIN, "https://evil.example")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(denied).await.unwrap();
        assert!(!response
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    }

    #[test]
    fn test_openapi_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/session",
            "/api/start-agent",
            "/api/stop-agent",
            "/api/business/save",
            "/api/business/load",
            "/api/google/auth-url",
            "/api/google/callback",
            "/api/google/status",
            "/api/agent-log",
            "/api/agent-events",
            "/api/llm/chat/completions",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
