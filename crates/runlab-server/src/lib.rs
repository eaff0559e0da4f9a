//! HTTP surface for the runlab snippet execution engine.
//!
//! Two routes make up the public contract: `POST /api/execute` runs a
//! snippet and returns its captured output, error trace and figures inline,
//! and `GET /api/temp/{filename}` streams a figure file out of the shared
//! workspace for clients that prefer fetching images by reference. Snippet
//! failures never surface as transport errors; only request validation
//! (400) and engine infrastructure failures (500) do.

pub mod error;

pub use error::{Result, ServerError};

use axum::extract::{DefaultBodyLimit, Json as AxumJson, Path as AxumPath, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, options, post};
use axum::{middleware, Router};
use runlab_core::{ExecuteRequest, ExecuteResponse, SnippetExecutor, WorkspaceManager};
use serde::Serialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub version: String,
}

/// Configuration for the runlab server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// Enable CORS
    pub enable_cors: bool,
    /// CORS allowed origins (if None, allows any origin)
    pub cors_origins: Option<Vec<String>>,
    /// Maximum request body size in bytes
    pub max_body_size: usize,
    /// Enable request logging
    pub enable_logging: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:5005".parse().unwrap(),
            enable_cors: true,
            cors_origins: None, // Allow any origin
            max_body_size: 1024 * 1024, // 1MB
            enable_logging: true,
        }
    }
}

impl ServerConfig {
    /// Create a new server configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bind address.
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Enable or disable CORS.
    pub fn with_cors(mut self, enable: bool) -> Self {
        self.enable_cors = enable;
        self
    }

    /// Set allowed CORS origins.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    /// Set maximum request body size.
    pub fn with_max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    /// Enable or disable request logging.
    pub fn with_logging(mut self, enable: bool) -> Self {
        self.enable_logging = enable;
        self
    }
}

/// Shared application state containing the engine and its workspace.
pub struct AppState<T: SnippetExecutor> {
    pub engine: Arc<T>,
    pub workspace: WorkspaceManager,
}

impl<T: SnippetExecutor> Clone for AppState<T> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            workspace: self.workspace.clone(),
        }
    }
}

/// Handler for the /api/execute POST endpoint.
async fn execute_handler<T: SnippetExecutor + 'static>(
    State(state): State<AppState<T>>,
    AxumJson(request): AxumJson<ExecuteRequest>,
) -> std::result::Result<Json<ExecuteResponse>, (StatusCode, Json<serde_json::Value>)> {
    // Validation happens before any engine work: a malformed request must
    // not touch the workspace.
    let code = match request.code.as_deref().filter(|code| !code.trim().is_empty()) {
        Some(code) => code,
        None => {
            let err = ServerError::missing_field("code");
            log::warn!("execute request rejected: {}", err);
            let status = StatusCode::from_u16(err.status_code())
                .unwrap_or(StatusCode::BAD_REQUEST);
            return Err((
                status,
                Json(json!({
                    "error": err.to_string(),
                    "timestamp": chrono::Utc::now()
                })),
            ));
        }
    };

    log::info!("executing snippet ({} bytes)", code.len());
    match state.engine.run(code).await {
        Ok(result) => {
            log::debug!(
                "execution finished: {} stdout bytes, {} stderr bytes, {} figures",
                result.stdout_text.len(),
                result.stderr_text.len(),
                result.figures.len()
            );
            Ok(Json(ExecuteResponse::from(result)))
        }
        Err(e) => {
            log::error!("execution engine failure: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "Execution engine failure",
                    "details": e.to_string(),
                    "timestamp": chrono::Utc::now()
                })),
            ))
        }
    }
}

/// Handler for the /api/temp/{filename} GET endpoint.
async fn temp_file_handler<T: SnippetExecutor + 'static>(
    State(state): State<AppState<T>>,
    AxumPath(filename): AxumPath<String>,
) -> std::result::Result<Response, (StatusCode, Json<serde_json::Value>)> {
    match state.workspace.read_file(&filename) {
        Ok(bytes) => {
            let content_type = if filename.ends_with(".png") {
                "image/png"
            } else {
                "application/octet-stream"
            };
            Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
        }
        Err(e) => {
            let err = ServerError::from(e);
            log::warn!("temp file request for '{}' failed: {}", filename, err);
            let status = StatusCode::from_u16(err.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            Err((
                status,
                Json(json!({
                    "error": err.to_string(),
                    "timestamp": chrono::Utc::now()
                })),
            ))
        }
    }
}

/// The main runlab HTTP server.
pub struct RunlabServer<T: SnippetExecutor> {
    engine: Arc<T>,
    workspace: WorkspaceManager,
    config: ServerConfig,
}

impl<T: SnippetExecutor + 'static> RunlabServer<T> {
    /// Create a new server with the given engine and default configuration.
    pub fn new(engine: Arc<T>, workspace: WorkspaceManager) -> Self {
        Self {
            engine,
            workspace,
            config: ServerConfig::default(),
        }
    }

    /// Create a new server with custom configuration.
    pub fn with_config(engine: Arc<T>, workspace: WorkspaceManager, config: ServerConfig) -> Self {
        Self {
            engine,
            workspace,
            config,
        }
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the Axum router with all routes and middleware.
    pub fn build_router(&self) -> Router {
        // Create shared state
        let state = AppState {
            engine: self.engine.clone(),
            workspace: self.workspace.clone(),
        };

        let mut router = Router::new()
            // Health endpoint
            .route(
                "/health",
                get(|| async {
                    Json(HealthResponse {
                        status: "healthy".to_string(),
                        timestamp: chrono::Utc::now(),
                        version: env!("CARGO_PKG_VERSION").to_string(),
                    })
                }),
            )
            // Execution endpoint
            .route("/api/execute", post(execute_handler::<T>))
            // Out-of-band figure retrieval
            .route("/api/temp/{filename}", get(temp_file_handler::<T>))
            // CORS preflight
            .route("/api/execute", options(|| async { StatusCode::OK }))
            // Add the shared state
            .with_state(state)
            .layer(DefaultBodyLimit::max(self.config.max_body_size));

        // Add middleware layers
        if self.config.enable_logging {
            router = router.layer(middleware::from_fn(
                |request: axum::http::Request<axum::body::Body>,
                 next: axum::middleware::Next| async {
                    let request_id = uuid::Uuid::new_v4().to_string();
                    let method = request.method().clone();
                    let uri = request.uri().clone();

                    log::info!("Request {} {} {}", request_id, method, uri);

                    let start = std::time::Instant::now();
                    let response = next.run(request).await;
                    let duration = start.elapsed();

                    log::info!("Response {} completed in {:?}", request_id, duration);

                    response
                },
            ));
        }

        router = router.layer(TraceLayer::new_for_http());

        // Add CORS layer if enabled
        if self.config.enable_cors {
            let cors_layer = if let Some(ref origins) = self.config.cors_origins {
                let origins: std::result::Result<Vec<_>, _> =
                    origins.iter().map(|s| s.parse()).collect();
                match origins {
                    Ok(origins) => CorsLayer::new()
                        .allow_origin(origins)
                        .allow_methods(Any)
                        .allow_headers(Any),
                    Err(_) => CorsLayer::permissive(),
                }
            } else {
                CorsLayer::permissive()
            };
            router = router.layer(cors_layer);
        }

        router
    }

    /// Start the server and listen for connections.
    ///
    /// This method will block until the server is shut down.
    pub async fn serve(self) -> Result<()> {
        let router = self.build_router();
        let listener = TcpListener::bind(self.config.bind_addr)
            .await
            .map_err(|e| {
                ServerError::config_error(format!(
                    "Failed to bind to {}: {}",
                    self.config.bind_addr, e
                ))
            })?;

        log::info!("runlab server starting on {}", self.config.bind_addr);
        log::info!("Health check: http://{}/health", self.config.bind_addr);
        log::info!("Execute endpoint: http://{}/api/execute", self.config.bind_addr);
        log::info!(
            "Figure retrieval: http://{}/api/temp/{{filename}}",
            self.config.bind_addr
        );

        axum::serve(listener, router)
            .await
            .map_err(|e| ServerError::internal(format!("Server error: {}", e)))?;

        Ok(())
    }

    /// Start the server with graceful shutdown support.
    ///
    /// The server will shut down when the provided shutdown signal is received.
    pub async fn serve_with_shutdown<F>(self, shutdown_signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let router = self.build_router();
        let listener = TcpListener::bind(self.config.bind_addr)
            .await
            .map_err(|e| {
                ServerError::config_error(format!(
                    "Failed to bind to {}: {}",
                    self.config.bind_addr, e
                ))
            })?;

        log::info!(
            "runlab server starting on {} with graceful shutdown",
            self.config.bind_addr
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| ServerError::internal(format!("Server error: {}", e)))?;

        log::info!("runlab server shut down gracefully");
        Ok(())
    }
}

/// Utility function to create a shutdown signal from Ctrl+C.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            log::info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            log::info!("Received SIGTERM, shutting down...");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use runlab_core::{CapturedFigure, EngineError, ExecutionResult};
    use std::sync::Mutex;
    use tower::ServiceExt; // for `oneshot`

    struct MockExecutor {
        result: ExecutionResult,
        last_code: Arc<Mutex<Option<String>>>,
    }

    impl MockExecutor {
        fn new(result: ExecutionResult) -> Self {
            Self {
                result,
                last_code: Arc::new(Mutex::new(None)),
            }
        }

        fn plain(stdout: &str, stderr: &str) -> Self {
            Self::new(ExecutionResult {
                stdout_text: stdout.to_string(),
                stderr_text: stderr.to_string(),
                figures: vec![],
            })
        }
    }

    #[async_trait]
    impl SnippetExecutor for MockExecutor {
        async fn run(&self, code: &str) -> std::result::Result<ExecutionResult, EngineError> {
            *self.last_code.lock().unwrap() = Some(code.to_string());
            Ok(self.result.clone())
        }
    }

    fn test_server(executor: MockExecutor) -> (RunlabServer<MockExecutor>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let workspace = WorkspaceManager::new(dir.path()).unwrap();
        (RunlabServer::new(Arc::new(executor), workspace), dir)
    }

    fn execute_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/execute")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn execute_returns_captured_output() {
        let (server, _dir) = test_server(MockExecutor::plain("hi\n", ""));
        let app = server.build_router();

        let response = app
            .oneshot(execute_request(r#"{"code": "print('hi')"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["output"], "hi\n");
        assert_eq!(body["error"], "");
        assert_eq!(body["figures"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn snippet_failure_is_still_http_200() {
        let (server, _dir) = test_server(MockExecutor::plain(
            "",
            "Traceback (most recent call last):\nZeroDivisionError: division by zero\n",
        ));
        let app = server.build_router();

        let response = app
            .oneshot(execute_request(r#"{"code": "1/0"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["output"], "");
        assert!(body["error"].as_str().unwrap().contains("ZeroDivisionError"));
    }

    #[tokio::test]
    async fn missing_code_is_rejected_before_the_engine_runs() {
        let executor = MockExecutor::plain("", "");
        let last_code = executor.last_code.clone();
        let (server, _dir) = test_server(executor);
        let app = server.build_router();

        let response = app.oneshot(execute_request("{}")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(body.get("error").is_some());
        assert!(last_code.lock().unwrap().is_none(), "engine must not run");
    }

    #[tokio::test]
    async fn empty_code_is_rejected() {
        let (server, _dir) = test_server(MockExecutor::plain("", ""));
        let app = server.build_router();

        let response = app
            .oneshot(execute_request(r#"{"code": ""}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn figures_are_passed_through_inline() {
        let (server, _dir) = test_server(MockExecutor::new(ExecutionResult {
            stdout_text: String::new(),
            stderr_text: String::new(),
            figures: vec![
                CapturedFigure {
                    sequence_index: 0,
                    filename: "figure_0.png".to_string(),
                    image_bytes: vec![0],
                    encoded_payload: "AA==".to_string(),
                },
                CapturedFigure {
                    sequence_index: 1,
                    filename: "figure_1.png".to_string(),
                    image_bytes: vec![1],
                    encoded_payload: "AQ==".to_string(),
                },
            ],
        }));
        let app = server.build_router();

        let response = app
            .oneshot(execute_request(r#"{"code": "plot twice"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let figures = body["figures"].as_array().unwrap();
        assert_eq!(figures.len(), 2);
        assert_eq!(figures[0]["filename"], "figure_0.png");
        assert_eq!(figures[0]["data"], "AA==");
        assert_eq!(figures[1]["filename"], "figure_1.png");
    }

    #[tokio::test]
    async fn temp_endpoint_streams_workspace_files() {
        let (server, dir) = test_server(MockExecutor::plain("", ""));
        std::fs::write(dir.path().join("figure_0.png"), b"fake png").unwrap();
        let app = server.build_router();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/temp/figure_0.png")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "image/png"
        );
        let body = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        assert_eq!(&body[..], b"fake png");
    }

    #[tokio::test]
    async fn temp_endpoint_rejects_traversal() {
        let (server, _dir) = test_server(MockExecutor::plain("", ""));
        let app = server.build_router();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/temp/..%2Fsecret.txt")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn temp_endpoint_unknown_file_is_404() {
        let (server, _dir) = test_server(MockExecutor::plain("", ""));
        let app = server.build_router();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/temp/figure_9.png")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn default_config_allows_cross_origin_requests() {
        let (server, _dir) = test_server(MockExecutor::plain("hi\n", ""));
        let app = server.build_router();

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/execute")
                    .header("content-type", "application/json")
                    .header("origin", "http://localhost:3000")
                    .body(Body::from(r#"{"code": "print('hi')"}"#.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            response
                .headers()
                .contains_key("access-control-allow-origin"),
            "default configuration must answer browser clients"
        );
    }

    #[tokio::test]
    async fn health_endpoint_reports_healthy() {
        let (server, _dir) = test_server(MockExecutor::plain("", ""));
        let app = server.build_router();

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["status"], "healthy");
    }
}
