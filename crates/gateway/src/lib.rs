//! HTTP gateway for the harbor assistant.
//!
//! Exposes the query loop over JSON. The public routes answer anyone; the
//! `/harbor` routes sit behind [`auth::guard`] for calls relayed by an
//! upstream application server.
//!
//! Built on Axum.

pub mod api;
pub mod auth;
pub mod error;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderName, HeaderValue, Method, header};
use axum::{
    Router, middleware,
    routing::{get, post},
};
use harbor_agent::QueryLoop;
use harbor_config::GatewayConfig;
use harbor_core::retrieval::DocumentStore;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

pub use error::{ApiError, ErrorResponse};

/// Shared application state for the gateway.
pub struct GatewayState {
    pub config: GatewayConfig,
    pub query_loop: Arc<QueryLoop>,
    /// Probed by `/health` when present.
    pub store: Option<Arc<dyn DocumentStore>>,
    /// Client for upstream token validation.
    pub http: reqwest::Client,
}

pub type SharedState = Arc<GatewayState>;

impl GatewayState {
    pub fn new(config: GatewayConfig, query_loop: Arc<QueryLoop>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.auth_timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            config,
            query_loop,
            store: None,
            http,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.store = Some(store);
        self
    }
}

/// Build the router with all routes and layers.
///
/// Layers applied:
/// - API key / bearer token guard on `/harbor`
/// - CORS from `gateway.allowed_origins`
/// - Request body size limit (1 MB)
/// - HTTP trace logging
pub fn build_router(state: SharedState) -> Router {
    let harbor = Router::new()
        .route("/query", post(api::harbor_query_handler))
        .route("/status", get(api::harbor_status_handler))
        .layer(middleware::from_fn_with_state(state.clone(), auth::guard));

    let cors = cors_layer(&state.config);

    Router::new()
        .route("/", get(api::root_handler))
        .route("/health", get(api::health_handler))
        .route("/status", get(api::status_handler))
        .route("/query", post(api::query_handler))
        .nest("/harbor", harbor)
        .with_state(state)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// `["*"]` allows any origin; otherwise the listed origins exactly.
fn cors_layer(config: &GatewayConfig) -> CorsLayer {
    let origin = if config.allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| match o.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = %o, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    let mut allow_headers = vec![header::CONTENT_TYPE, header::AUTHORIZATION];
    match HeaderName::from_bytes(config.api_key_header.as_bytes()) {
        Ok(name) => allow_headers.push(name),
        Err(_) => warn!(header = %config.api_key_header, "Invalid API key header name"),
    }

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(allow_headers)
        .max_age(Duration::from_secs(3600))
}

/// Start the gateway HTTP server.
pub async fn start(state: GatewayState) -> std::io::Result<()> {
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let guarded = state.config.internal_api_key.is_some();
    let app = build_router(Arc::new(state));

    info!(addr = %addr, api_key_required = guarded, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use harbor_agent::ModelGateway;
    use harbor_core::error::ProviderError;
    use harbor_core::provider::{Provider, ProviderRequest, ProviderResponse};
    use harbor_core::tool::ToolRegistry;
    use http_body_util::BodyExt;
    use std::sync::Mutex;
    use tower::ServiceExt;

    /// Answers every prompt with the same text and records the prompts.
    struct EchoProvider {
        reply: String,
        prompts: Mutex<Vec<String>>,
    }

    impl EchoProvider {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.into(),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Provider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }

        async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            self.prompts.lock().unwrap().push(request.prompt);
            Ok(ProviderResponse {
                text: self.reply.clone(),
                model: request.model,
                usage: None,
            })
        }
    }

    fn app_with(config: GatewayConfig, provider: Arc<EchoProvider>) -> Router {
        let query_loop = QueryLoop::new(
            ModelGateway::new(provider, "mock-model"),
            Arc::new(ToolRegistry::new()),
        );
        build_router(Arc::new(GatewayState::new(config, Arc::new(query_loop))))
    }

    fn app() -> Router {
        app_with(
            GatewayConfig::default(),
            EchoProvider::new(r#"{"reasoning": "simple", "content": "Berth 4 is on the east quay."}"#),
        )
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn health_endpoint() {
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = json_body(response).await;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["agent_status"], "ready");
        assert_eq!(json["api_version"], "1.0.0");
    }

    struct DownStore;

    #[async_trait]
    impl DocumentStore for DownStore {
        fn name(&self) -> &str {
            "down"
        }

        async fn search(
            &self,
            _request: &harbor_core::retrieval::SearchRequest,
        ) -> Result<Vec<harbor_core::retrieval::SearchPassage>, harbor_core::RetrievalError> {
            Ok(Vec::new())
        }

        async fn health_check(&self) -> Result<bool, harbor_core::RetrievalError> {
            Err(harbor_core::RetrievalError::Unavailable("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn health_reports_store_state() {
        let json = json_body(
            app()
                .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(json["retrieval_status"], "unknown");

        let query_loop = QueryLoop::new(
            ModelGateway::new(EchoProvider::new("x"), "mock-model"),
            Arc::new(ToolRegistry::new()),
        );
        let state = GatewayState::new(GatewayConfig::default(), Arc::new(query_loop))
            .with_store(Arc::new(DownStore));
        let response = build_router(Arc::new(state))
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["retrieval_status"], "unavailable");
    }

    #[tokio::test]
    async fn root_and_status() {
        let response = app()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(json_body(response).await["status"], "running");

        let response = app()
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = json_body(response).await;
        assert_eq!(json["agent_initialized"], true);
        assert!(json["endpoints"].as_array().unwrap().iter().any(|e| e["path"] == "/query"));
    }

    #[tokio::test]
    async fn query_returns_answer() {
        let response = app()
            .oneshot(post_json("/query", serde_json::json!({"query": "Where is berth 4?"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = json_body(response).await;
        assert_eq!(json["answer"], "Berth 4 is on the east quay.");
        assert_eq!(json["query"], "Where is berth 4?");
        assert_eq!(json["iterations"], 1);
        assert_eq!(json["success"], true);
        assert!(json["tool_calls"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn blank_query_is_rejected() {
        let response = app()
            .oneshot(post_json("/query", serde_json::json!({"query": "   "})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["code"], "INVALID_QUERY");
    }

    #[tokio::test]
    async fn malformed_body_is_json_error() {
        let req = Request::builder()
            .method("POST")
            .uri("/query")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app().oneshot(req).await.unwrap();
        assert!(response.status().is_client_error());
        assert_eq!(json_body(response).await["code"], "INVALID_BODY");
    }

    #[tokio::test]
    async fn harbor_query_open_when_no_key_configured() {
        let provider = EchoProvider::new(r#"{"content": "Pilotage is compulsory."}"#);
        let app = app_with(GatewayConfig::default(), provider.clone());

        let response = app
            .oneshot(post_json(
                "/harbor/query",
                serde_json::json!({
                    "query": "Is pilotage required?",
                    "session_id": "s-1",
                    "context": "vessel over 500 GT"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = json_body(response).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["answer"], "Pilotage is compulsory.");
        assert_eq!(json["iterations"], 1);
        assert!(json["processing_time"].as_f64().unwrap() >= 0.0);
        assert!(json["timestamp"].is_string());

        let prompts = provider.prompts.lock().unwrap();
        assert!(prompts[0].contains("Is pilotage required?\n\nAdditional context: vessel over 500 GT"));
    }

    #[tokio::test]
    async fn harbor_query_length_limit() {
        let long = "a".repeat(1001);
        let response = app()
            .oneshot(post_json("/harbor/query", serde_json::json!({"query": long})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    fn keyed_config() -> GatewayConfig {
        GatewayConfig {
            internal_api_key: Some("internal-secret".into()),
            ..GatewayConfig::default()
        }
    }

    #[tokio::test]
    async fn api_key_is_enforced() {
        let app = app_with(keyed_config(), EchoProvider::new(r#"{"content": "ok"}"#));

        let missing = app
            .clone()
            .oneshot(Request::builder().uri("/harbor/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(missing).await["error"], "Invalid API key");

        let wrong = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/harbor/status")
                    .header("X-API-Key", "guess")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

        let ok = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/harbor/status")
                    .header("X-API-Key", "internal-secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(ok.status(), StatusCode::OK);
        assert_eq!(json_body(ok).await["status"], "active");

        // Public routes are not guarded.
        let public = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(public.status(), StatusCode::OK);
    }

    /// Local auth service accepting only `Bearer good-token`.
    async fn spawn_auth_service() -> String {
        async fn validate(headers: axum::http::HeaderMap) -> StatusCode {
            match headers.get("authorization").and_then(|v| v.to_str().ok()) {
                Some("Bearer good-token") => StatusCode::OK,
                _ => StatusCode::FORBIDDEN,
            }
        }
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, Router::new().route("/api/auth/validate", post(validate)))
                .await
                .unwrap();
        });
        format!("http://{addr}/api/auth/validate")
    }

    #[tokio::test]
    async fn bearer_token_is_validated_upstream() {
        let config = GatewayConfig {
            auth_validation_url: Some(spawn_auth_service().await),
            ..GatewayConfig::default()
        };
        let app = app_with(config, EchoProvider::new(r#"{"content": "ok"}"#));

        let status = |token: &'static str| {
            let app = app.clone();
            async move {
                app.oneshot(
                    Request::builder()
                        .uri("/harbor/status")
                        .header("Authorization", format!("Bearer {token}"))
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap()
                .status()
            }
        };

        assert_eq!(status("good-token").await, StatusCode::OK);
        assert_eq!(status("stolen-token").await, StatusCode::UNAUTHORIZED);

        // No token at all: the bearer check does not apply.
        let response = app
            .oneshot(Request::builder().uri("/harbor/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn wildcard_and_listed_origins() {
        let any = GatewayConfig {
            allowed_origins: vec!["*".into()],
            ..GatewayConfig::default()
        };
        let app = app_with(any, EchoProvider::new("x"));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header("Origin", "http://example.org")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()["access-control-allow-origin"], "*");

        let response = app_with(GatewayConfig::default(), EchoProvider::new("x"))
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header("Origin", "http://localhost:3000")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response.headers()["access-control-allow-origin"],
            "http://localhost:3000"
        );
    }
}
