//! Custom theme CSS discovery and serving.
//!
//! Users can drop a `custom.css` into `~/.wikimd/` (global) or
//! `<root>/.wikimd/` (per-wiki). Discovery resolves symlinks and only
//! accepts files whose real path stays inside their `.wikimd` directory;
//! serving enforces the `.css` extension, a 1 MiB size cap, and
//! `If-Modified-Since` revalidation keyed by mtime.

use crate::log;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Maximum custom CSS file size.
pub const MAX_CSS_SIZE: u64 = 1 << 20;

/// Locate custom theme CSS files in the global and per-wiki locations.
pub fn discover(root: &Path) -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Some(home) = dirs::home_dir() {
        let allowed = home.join(".wikimd");
        if let Some(css) = validate_css_path(&allowed.join("custom.css"), &allowed) {
            log!("serve"; "found global custom CSS: {}", css.display());
            paths.push(css);
        }
    }

    let allowed = root.join(".wikimd");
    if let Some(css) = validate_css_path(&allowed.join("custom.css"), &allowed) {
        log!("serve"; "found wiki custom CSS: {}", css.display());
        paths.push(css);
    }

    paths
}

/// Validate one candidate CSS file: must exist as a regular `.css` file
/// and, after symlink resolution, remain inside the allowed directory.
fn validate_css_path(css: &Path, allowed_dir: &Path) -> Option<PathBuf> {
    let meta = std::fs::metadata(css).ok()?;
    if !meta.is_file() {
        return None;
    }
    if css.extension().is_none_or(|ext| ext != "css") {
        return None;
    }

    let real = css.canonicalize().ok()?;
    let real_allowed = allowed_dir.canonicalize().ok()?;
    if !real.starts_with(&real_allowed) {
        log!("serve"; "custom CSS outside allowed directory: {}", real.display());
        return None;
    }
    Some(real)
}

/// Truncate an mtime to whole seconds for HTTP date comparison.
pub fn http_mtime(modified: SystemTime) -> SystemTime {
    let secs = modified
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(secs)
}
