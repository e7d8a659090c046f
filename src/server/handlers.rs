//! HTTP route handlers: HTML shell, JSON API, SSE stream, media, assets.

use crate::content::ChangeEvent;
use crate::error::WikiError;
use crate::paths::PathValidator;
use crate::search::SearchOptions;
use crate::server::css::MAX_CSS_SIZE;
use crate::server::templates::{self, ShellView};
use crate::server::SharedState;
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use axum::response::sse::{Event as SseEvent, Sse};
use axum::response::{Html, IntoResponse, Response};
use chrono::Utc;
use futures::StreamExt;
use futures::stream;
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::time::SystemTime;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

const EMBEDDED_APP_CSS: &str = include_str!("../../assets/static/app.css");
const EMBEDDED_APP_JS: &str = include_str!("../../assets/static/app.js");

// ============================================================================
// Helpers
// ============================================================================

/// Trim a wildcard path segment; axum has already percent-decoded it.
fn parse_wildcard_path(raw: &str) -> Result<String, WikiError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(WikiError::InvalidPayload("path is required".into()));
    }
    Ok(trimmed.to_string())
}

/// Decode a JSON request body: single object, unknown fields rejected.
fn decode_json<T: serde::de::DeserializeOwned>(body: &Bytes) -> Result<T, WikiError> {
    if body.is_empty() {
        return Err(WikiError::InvalidPayload("request body is required".into()));
    }
    serde_json::from_slice(body)
        .map_err(|_| WikiError::InvalidPayload("invalid JSON payload".into()))
}

fn is_htmx(headers: &HeaderMap) -> bool {
    headers.contains_key("hx-request")
}

/// Build an `HX-Trigger` header value from event descriptions.
fn hx_trigger(events: serde_json::Value) -> (HeaderName, HeaderValue) {
    let value = HeaderValue::from_str(&events.to_string())
        .unwrap_or_else(|_| HeaderValue::from_static("{}"));
    (HeaderName::from_static("hx-trigger"), value)
}

fn error_json(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn redirect(status: StatusCode, location: &str) -> Response {
    let value = HeaderValue::from_str(location).unwrap_or_else(|_| HeaderValue::from_static("/"));
    (status, [(header::LOCATION, value)]).into_response()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

// ============================================================================
// Health and landing
// ============================================================================

pub async fn health() -> StatusCode {
    StatusCode::OK
}

#[derive(Deserialize, Default)]
pub struct RootQuery {
    #[serde(default)]
    page: Option<String>,
}

/// Landing page: redirect to the first document, or render the empty
/// state when the wiki has no markdown yet.
pub async fn root_index(
    State(state): State<SharedState>,
    Query(query): Query<RootQuery>,
) -> Response {
    let tree = match state.content.current_tree() {
        Ok(tree) => tree,
        Err(e) => return e.into_response(),
    };

    // Legacy query-parameter routing.
    if let Some(page) = query.page.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
        return redirect(StatusCode::MOVED_PERMANENTLY, &format!("/page/{page}"));
    }

    if let Some(first) = tree.first_document() {
        return redirect(StatusCode::FOUND, &format!("/page/{first}"));
    }

    let shell = templates::shell(&ShellView {
        tree: Some(&tree),
        active_path: "",
        title: &tree.name,
        content: "<div class=\"page-empty\">No documents yet. Create a markdown file under the wiki root to get started.</div>".into(),
        dark: state.config.dark,
        custom_css_count: state.css_paths.len(),
    });
    Html(shell).into_response()
}

/// Full-page render with navigation. A missing document still renders the
/// shell, with a 404 status.
pub async fn page_shell(
    State(state): State<SharedState>,
    Path(raw): Path<String>,
) -> Response {
    let path = match parse_wildcard_path(&raw) {
        Ok(path) => path,
        Err(e) => return e.into_response(),
    };

    let tree = match state.content.current_tree() {
        Ok(tree) => tree,
        Err(e) => return e.into_response(),
    };

    match state.content.document(&path).await {
        Ok(doc) => {
            let title = if doc.metadata.title.is_empty() {
                templates::title_from_path(&path)
            } else {
                doc.metadata.title.clone()
            };
            let shell = templates::shell(&ShellView {
                tree: Some(&tree),
                active_path: &path,
                title: &title,
                content: templates::page(&path, &doc, Some(&tree)),
                dark: state.config.dark,
                custom_css_count: state.css_paths.len(),
            });
            Html(shell).into_response()
        }
        Err(WikiError::NotFound(_)) => {
            let shell = templates::shell(&ShellView {
                tree: Some(&tree),
                active_path: &path,
                title: &format!("{} (missing)", templates::title_from_path(&path)),
                content: templates::missing_page(&path),
                dark: state.config.dark,
                custom_css_count: state.css_paths.len(),
            });
            (StatusCode::NOT_FOUND, Html(shell)).into_response()
        }
        Err(e) => e.into_response(),
    }
}

// ============================================================================
// Tree and page API
// ============================================================================

#[derive(Deserialize, Default)]
pub struct TreeQuery {
    #[serde(default)]
    current: Option<String>,
    #[serde(default)]
    page: Option<String>,
}

pub async fn api_tree(
    State(state): State<SharedState>,
    Query(query): Query<TreeQuery>,
    headers: HeaderMap,
) -> Response {
    let tree = match state.content.current_tree() {
        Ok(tree) => tree,
        Err(_) => return error_json(StatusCode::INTERNAL_SERVER_ERROR, "failed to load tree"),
    };

    if is_htmx(&headers) {
        let active = query
            .current
            .or(query.page)
            .unwrap_or_default();
        let trigger = hx_trigger(json!({ "treeUpdated": { "active": active } }));
        return ([trigger], Html(templates::tree(&tree, &active))).into_response();
    }

    Json(json!({
        "generatedAt": Utc::now(),
        "root": &*tree,
    }))
    .into_response()
}

#[derive(Deserialize, Default)]
pub struct PageQuery {
    #[serde(default)]
    format: Option<String>,
}

pub async fn api_page(
    State(state): State<SharedState>,
    Path(raw): Path<String>,
    Query(query): Query<PageQuery>,
    headers: HeaderMap,
) -> Response {
    let path = match parse_wildcard_path(&raw) {
        Ok(path) => path,
        Err(e) => return e.into_response(),
    };

    let doc = match state.content.document(&path).await {
        Ok(doc) => doc,
        Err(WikiError::NotFound(_)) if is_htmx(&headers) => {
            // HTMX swaps only 2xx responses; the missing notice is the
            // content here, so it ships as a successful fragment.
            let trigger = hx_trigger(json!({
                "pageLoaded": { "path": path, "missing": true }
            }));
            let path_header = wikimd_path_header(&path);
            return ([trigger, path_header], Html(templates::missing_page(&path))).into_response();
        }
        Err(e) => return e.into_response(),
    };

    if is_htmx(&headers) {
        let tree = state.content.current_tree().ok();
        let fragment = templates::page(&path, &doc, tree.as_deref());
        let title = if doc.metadata.title.is_empty() {
            templates::title_from_path(&path)
        } else {
            doc.metadata.title.clone()
        };
        let trigger = hx_trigger(json!({
            "pageLoaded": { "path": path, "title": title }
        }));
        let path_header = wikimd_path_header(&path);
        return ([trigger, path_header], Html(fragment)).into_response();
    }

    let format = query
        .format
        .as_deref()
        .map(|f| f.trim().to_ascii_lowercase())
        .unwrap_or_default();
    if format == "raw" || format == "markdown" {
        return Json(json!({
            "path": path,
            "raw": doc.raw,
            "metadata": doc.metadata,
            "modified": doc.modified,
        }))
        .into_response();
    }

    Json(json!({
        "path": path,
        "html": doc.html,
        "metadata": doc.metadata,
        "modified": doc.modified,
    }))
    .into_response()
}

fn wikimd_path_header(path: &str) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("x-wikimd-path"),
        HeaderValue::from_str(path).unwrap_or_else(|_| HeaderValue::from_static("")),
    )
}

// ============================================================================
// Mutations
// ============================================================================

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreatePayload {
    path: String,
    #[serde(default)]
    content: String,
}

pub async fn api_create(State(state): State<SharedState>, body: Bytes) -> Response {
    let payload: CreatePayload = match decode_json(&body) {
        Ok(payload) => payload,
        Err(e) => return e.into_response(),
    };

    let path = payload.path.trim().to_string();
    if path.is_empty() {
        return error_json(StatusCode::BAD_REQUEST, "path is required");
    }

    match state.content.create(&path, payload.content.as_bytes()).await {
        Ok(()) => (
            StatusCode::CREATED,
            Json(json!({ "path": path, "message": "created" })),
        )
            .into_response(),
        // A missing parent is a caller mistake, not a lookup failure.
        Err(e @ WikiError::NotFound(_)) => error_json(StatusCode::BAD_REQUEST, &e.to_string()),
        Err(e) => e.into_response(),
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SavePayload {
    #[serde(default)]
    content: String,
}

pub async fn api_save(
    State(state): State<SharedState>,
    Path(raw): Path<String>,
    body: Bytes,
) -> Response {
    let path = match parse_wildcard_path(&raw) {
        Ok(path) => path,
        Err(e) => return e.into_response(),
    };
    let payload: SavePayload = match decode_json(&body) {
        Ok(payload) => payload,
        Err(e) => return e.into_response(),
    };

    match state.content.save(&path, payload.content.as_bytes()).await {
        Ok(()) => Json(json!({ "path": path, "message": "saved" })).into_response(),
        Err(e) => e.into_response(),
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RenamePayload {
    from: String,
    to: String,
}

pub async fn api_rename(State(state): State<SharedState>, body: Bytes) -> Response {
    let payload: RenamePayload = match decode_json(&body) {
        Ok(payload) => payload,
        Err(e) => return e.into_response(),
    };

    let from = payload.from.trim().to_string();
    let to = payload.to.trim().to_string();
    if from.is_empty() || to.is_empty() {
        return error_json(StatusCode::BAD_REQUEST, "from and to paths are required");
    }
    if from == to {
        return error_json(
            StatusCode::BAD_REQUEST,
            "destination path must differ from source",
        );
    }

    match state.content.rename(&from, &to).await {
        Ok(()) => Json(json!({ "from": from, "to": to, "message": "renamed" })).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn api_delete(State(state): State<SharedState>, Path(raw): Path<String>) -> Response {
    let path = match parse_wildcard_path(&raw) {
        Ok(path) => path,
        Err(e) => return e.into_response(),
    };

    match state.content.delete(&path).await {
        Ok(()) => Json(json!({ "path": path, "message": "deleted" })).into_response(),
        Err(e) => e.into_response(),
    }
}

// ============================================================================
// Search
// ============================================================================

pub async fn api_search(
    State(state): State<SharedState>,
    Query(params): Query<Vec<(String, String)>>,
    headers: HeaderMap,
) -> Response {
    let Some(search) = &state.search else {
        return WikiError::SearchUnavailable.into_response();
    };

    let first = |key: &str| {
        params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    };

    let query = first("q").unwrap_or_default().to_string();
    if query.trim().is_empty() {
        if is_htmx(&headers) {
            let trigger = hx_trigger(json!({
                "searchResults": { "query": "", "count": 0 }
            }));
            return ([trigger], Html(templates::search("", &[]))).into_response();
        }
        return error_json(StatusCode::BAD_REQUEST, "query parameter 'q' is required");
    }

    let mut opts = SearchOptions::default();
    if let Some(value) = first("caseSensitive") {
        match parse_bool(value) {
            Some(b) => opts.case_sensitive = b,
            None => return error_json(StatusCode::BAD_REQUEST, "invalid caseSensitive value"),
        }
    }
    if let Some(value) = first("context") {
        match value.parse::<usize>() {
            Ok(n) => opts.context = n,
            Err(_) => return error_json(StatusCode::BAD_REQUEST, "invalid context value"),
        }
    }
    if let Some(value) = first("hidden") {
        match parse_bool(value) {
            Some(b) => opts.search_hidden = b,
            None => return error_json(StatusCode::BAD_REQUEST, "invalid hidden value"),
        }
    }
    for (key, value) in &params {
        match key.as_str() {
            "glob" => opts.include_globs.push(value.clone()),
            "exclude" => opts.exclude_globs.push(value.clone()),
            _ => {}
        }
    }

    // The wiki only searches markdown.
    opts.include_globs.push("*.md".into());
    opts.include_globs.push("*.markdown".into());

    let results = match search.search(&query, &opts).await {
        Ok(results) => results,
        Err(e) => return error_json(StatusCode::BAD_REQUEST, &e.to_string()),
    };

    if is_htmx(&headers) {
        let trigger = hx_trigger(json!({
            "searchResults": { "query": query, "count": results.len() }
        }));
        return ([trigger], Html(templates::search(&query, &results))).into_response();
    }

    Json(json!({
        "query": query,
        "count": results.len(),
        "results": results,
        "options": opts,
    }))
    .into_response()
}

// ============================================================================
// Event stream
// ============================================================================

/// Server-sent event stream of change notifications.
///
/// Emits a `: ready` comment immediately, then one `data:` record per
/// event. The subscription is cancelled when the client disconnects and
/// the stream drops. No retry hints are sent; the client owns backoff.
pub async fn events(State(state): State<SharedState>) -> Response {
    let cancel = CancellationToken::new();
    let rx = state.content.subscribe(cancel.clone());
    let guard = cancel.drop_guard();

    let ready = stream::once(async { Ok::<_, Infallible>(SseEvent::default().comment("ready")) });
    let updates = ReceiverStream::new(rx).map(move |event: ChangeEvent| {
        // The guard lives as long as the stream; dropping it cancels the
        // subscription server-side.
        let _keep = &guard;
        let payload = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
        Ok(SseEvent::default().data(payload))
    });

    (
        [
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        Sse::new(ready.chain(updates)),
    )
        .into_response()
}

// ============================================================================
// Media and assets
// ============================================================================

/// Serve an arbitrary file under the wiki root with path validation.
pub async fn media(State(state): State<SharedState>, Path(raw): Path<String>) -> Response {
    let path = match parse_wildcard_path(&raw) {
        Ok(path) => path,
        Err(e) => return e.into_response(),
    };

    let validator = PathValidator::new(&state.config.root);
    let (_, abs) = match validator.resolve_any(&path) {
        Ok(resolved) => resolved,
        Err(e) => return e.into_response(),
    };

    let meta = match tokio::fs::metadata(&abs).await {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return error_json(StatusCode::NOT_FOUND, "file not found");
        }
        Err(_) => return error_json(StatusCode::INTERNAL_SERVER_ERROR, "internal server error"),
    };
    if meta.is_dir() {
        return error_json(StatusCode::BAD_REQUEST, "path is a directory");
    }

    let content = match tokio::fs::read(&abs).await {
        Ok(content) => content,
        Err(_) => return error_json(StatusCode::INTERNAL_SERVER_ERROR, "internal server error"),
    };

    let mime = mime_guess::from_path(&abs).first_or_octet_stream();
    (
        [(header::CONTENT_TYPE, mime.as_ref().to_string())],
        content,
    )
        .into_response()
}

/// Serve the embedded frontend assets (used when no `--assets` override
/// is configured).
pub async fn embedded_static(Path(raw): Path<String>) -> Response {
    match raw.trim_start_matches('/') {
        "app.css" => ([(header::CONTENT_TYPE, "text/css; charset=utf-8")], EMBEDDED_APP_CSS)
            .into_response(),
        "app.js" => (
            [(header::CONTENT_TYPE, "application/javascript; charset=utf-8")],
            EMBEDDED_APP_JS,
        )
            .into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

// ============================================================================
// Custom theme CSS
// ============================================================================

pub async fn custom_theme(
    State(state): State<SharedState>,
    Path(index): Path<String>,
    headers: HeaderMap,
) -> Response {
    let Ok(index) = index.parse::<usize>() else {
        return error_json(StatusCode::BAD_REQUEST, "invalid CSS index");
    };
    let Some(path) = state.css_paths.get(index) else {
        return error_json(StatusCode::NOT_FOUND, "CSS file not found");
    };

    if path.extension().is_none_or(|ext| ext != "css") {
        return error_json(StatusCode::FORBIDDEN, "invalid file type");
    }

    let meta = match tokio::fs::metadata(path).await {
        Ok(meta) => meta,
        Err(_) => return error_json(StatusCode::NOT_FOUND, "CSS file not found"),
    };
    if meta.len() > MAX_CSS_SIZE {
        return error_json(StatusCode::PAYLOAD_TOO_LARGE, "CSS file too large");
    }

    let modified = crate::server::css::http_mtime(
        meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
    );
    if let Some(since) = headers
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| httpdate::parse_http_date(v).ok())
        && modified <= since
    {
        return StatusCode::NOT_MODIFIED.into_response();
    }

    let content = match tokio::fs::read(path).await {
        Ok(content) => content,
        Err(_) => return error_json(StatusCode::INTERNAL_SERVER_ERROR, "error reading CSS file"),
    };

    (
        [
            (header::CONTENT_TYPE, "text/css; charset=utf-8".to_string()),
            (header::LAST_MODIFIED, httpdate::fmt_http_date(modified)),
            (
                header::CACHE_CONTROL,
                "public, max-age=60, must-revalidate".to_string(),
            ),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff".to_string()),
            (header::X_FRAME_OPTIONS, "DENY".to_string()),
        ],
        content,
    )
        .into_response()
}
