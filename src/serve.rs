//! HTTP server startup, graceful shutdown, and browser auto-open.

use crate::config::Config;
use crate::log;
use crate::server::{AppState, SharedState, router};
use anyhow::{Context, Result};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Grace period for in-flight connections after shutdown begins.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Delay before the browser opens, giving the listener time to accept.
const AUTO_OPEN_DELAY: Duration = Duration::from_millis(300);

/// Bind, announce, and serve until Ctrl+C. Returns after graceful
/// shutdown completes or the grace period expires.
pub async fn serve(state: Arc<AppState>, shutdown: CancellationToken) -> Result<()> {
    // Port 0 auto-assigns on loopback; explicit ports bind all interfaces.
    let addr = if state.config.port == 0 {
        SocketAddr::from((Ipv4Addr::LOCALHOST, 0))
    } else {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, state.config.port))
    };

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to address {addr}"))?;
    let local = listener.local_addr().context("read listener address")?;
    let url = format!("http://localhost:{}", local.port());

    println!("WikiMD server listening on {url}");
    log!("serve"; "root: {}", state.config.root.display());

    if state.config.auto_open {
        tokio::spawn(open_browser_when_ready(url.clone(), shutdown.clone()));
    }

    let app = router(Arc::clone(&state));
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown(shutdown.clone()));

    // The grace period bounds how long draining connections can hold up
    // process exit.
    tokio::select! {
        result = async { server.await } => result.context("server error")?,
        _ = async {
            shutdown.cancelled().await;
            tokio::time::sleep(SHUTDOWN_GRACE).await;
        } => {
            log!("serve"; "shutdown grace period expired");
        }
    }

    Ok(())
}

/// Resolves when Ctrl+C arrives or an external cancellation fires, and
/// propagates the cancellation either way.
async fn wait_for_shutdown(shutdown: CancellationToken) {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            log!("serve"; "shutting down gracefully...");
            shutdown.cancel();
        }
        _ = shutdown.cancelled() => {}
    }
}

async fn open_browser_when_ready(url: String, shutdown: CancellationToken) {
    tokio::select! {
        _ = shutdown.cancelled() => {}
        _ = tokio::time::sleep(AUTO_OPEN_DELAY) => {
            if let Err(e) = open_browser(&url) {
                log!("serve"; "auto-open failed: {e}");
            }
        }
    }
}

fn open_browser(url: &str) -> std::io::Result<()> {
    #[cfg(target_os = "macos")]
    let mut command = {
        let mut command = std::process::Command::new("open");
        command.arg(url);
        command
    };
    #[cfg(target_os = "windows")]
    let mut command = {
        let mut command = std::process::Command::new("rundll32");
        command.args(["url.dll,FileProtocolHandler", url]);
        command
    };
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    let mut command = {
        let mut command = std::process::Command::new("xdg-open");
        command.arg(url);
        command
    };

    command
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .map(|_| ())
}

/// Re-exported for the entrypoint: build shared state from configured
/// services.
pub fn app_state(
    config: Config,
    content: Arc<crate::content::ContentService>,
    search: Option<Arc<crate::search::SearchService>>,
) -> SharedState {
    let css_paths = crate::server::css::discover(&config.root);
    Arc::new(AppState {
        config,
        content,
        search,
        css_paths,
    })
}
