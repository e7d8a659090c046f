//! HTTP router, shared state, and middleware stack.
//!
//! Middleware order, outermost first: panic recovery, CSRF gate,
//! compression, request logging, handler timeout, body size limit. The
//! CSRF gate runs before routing so every mutating endpoint is covered by
//! construction.

pub mod csrf;
pub mod css;
pub mod handlers;
pub mod templates;

use crate::config::Config;
use crate::content::ContentService;
use crate::log;
use crate::search::SearchService;
use axum::Router;
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::compression::CompressionLayer;
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;

/// JSON request bodies are limited to 4 MiB.
const MAX_BODY_BYTES: usize = 4 << 20;

/// Per-request handler deadline. Streaming bodies (SSE) are unaffected:
/// the deadline covers response construction, not the stream.
const HANDLER_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared application state available to every handler.
pub struct AppState {
    pub config: Config,
    pub content: Arc<ContentService>,
    pub search: Option<Arc<SearchService>>,
    pub css_paths: Vec<PathBuf>,
}

pub type SharedState = Arc<AppState>;

/// Build the full application router with middleware applied.
pub fn router(state: SharedState) -> Router {
    let routes = Router::new()
        .route("/", get(handlers::root_index))
        .route("/healthz", get(handlers::health))
        .route("/page/{*path}", get(handlers::page_shell))
        .route("/api/tree", get(handlers::api_tree))
        .route("/api/page", post(handlers::api_create))
        .route("/api/page/rename", post(handlers::api_rename))
        .route(
            "/api/page/{*path}",
            get(handlers::api_page)
                .put(handlers::api_save)
                .delete(handlers::api_delete),
        )
        .route("/api/search", get(handlers::api_search))
        .route("/events", get(handlers::events))
        .route("/media/{*path}", get(handlers::media))
        .route("/custom-theme/{index}", get(handlers::custom_theme));

    let routes = match &state.config.assets_dir {
        Some(dir) => routes.nest_service("/static", ServeDir::new(dir)),
        None => routes.route("/static/{*path}", get(handlers::embedded_static)),
    };

    routes
        .layer(
            ServiceBuilder::new()
                .layer(CatchPanicLayer::custom(handle_panic))
                .layer(middleware::from_fn(csrf::csrf_gate))
                .layer(CompressionLayer::new())
                .layer(middleware::from_fn_with_state(
                    Arc::clone(&state),
                    request_logger,
                ))
                .layer(TimeoutLayer::new(HANDLER_TIMEOUT))
                .layer(DefaultBodyLimit::max(MAX_BODY_BYTES)),
        )
        .with_state(state)
}

/// Panic recovery: log with request context lost upstream, answer 500.
fn handle_panic(err: Box<dyn std::any::Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    log!("error"; "panic recovered: {detail}");
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
}

/// Request logging, gated on `--verbose`.
async fn request_logger(State(state): State<SharedState>, req: Request, next: Next) -> Response {
    if !state.config.verbose {
        return next.run(req).await;
    }

    let method = req.method().clone();
    let uri = req.uri().clone();
    let start = Instant::now();
    let response = next.run(req).await;
    log!(
        "serve";
        "{method} {uri} {} {:.1?}",
        response.status().as_u16(),
        start.elapsed()
    );
    response
}
