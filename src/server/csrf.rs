//! CSRF protection for mutation endpoints.
//!
//! Validates `Origin` (falling back to `Referer`) against the request host
//! for every state-changing request. Safe methods and the health/static
//! endpoints bypass the check. Loopback spellings (`localhost`,
//! `127.0.0.1`, `[::1]`) are treated as the same host.

use axum::extract::Request;
use axum::http::{HeaderMap, Method, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

/// Middleware entry point, applied before routing.
pub async fn csrf_gate(req: Request, next: Next) -> Response {
    let method = req.method();
    if method == Method::GET || method == Method::HEAD || method == Method::OPTIONS {
        return next.run(req).await;
    }

    let path = req.uri().path();
    if path == "/healthz" || path.starts_with("/static/") {
        return next.run(req).await;
    }

    if !valid_origin(req.headers()) {
        return (StatusCode::FORBIDDEN, "Forbidden: Invalid origin").into_response();
    }

    next.run(req).await
}

/// Whether the request's Origin (or Referer) host matches its Host.
fn valid_origin(headers: &HeaderMap) -> bool {
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .or_else(|| {
            headers
                .get(header::REFERER)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
        });
    let Some(origin) = origin else {
        return false;
    };

    let Some(request_host) = headers.get(header::HOST).and_then(|v| v.to_str().ok()) else {
        return false;
    };

    normalize_host(host_of(origin)) == normalize_host(request_host)
}

/// Extract `host[:port]` from a URL-ish header value.
fn host_of(url: &str) -> &str {
    let rest = match url.find("://") {
        Some(idx) => &url[idx + 3..],
        None => url,
    };
    match rest.find('/') {
        Some(idx) => &rest[..idx],
        None => rest,
    }
}

/// Strip the port and collapse loopback spellings onto `localhost`.
fn normalize_host(host: &str) -> String {
    let bare = if let Some(rest) = host.strip_prefix('[') {
        // Bracketed IPv6, with or without a port suffix.
        rest.split(']').next().unwrap_or(rest)
    } else {
        host.rsplit_once(':').map_or(host, |(h, _)| h)
    };

    match bare {
        "localhost" | "127.0.0.1" | "::1" => "localhost".to_string(),
        other => other.to_ascii_lowercase(),
    }
}
