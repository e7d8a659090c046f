//! Wiki link and image destination rewriting.
//!
//! Markdown documents reference each other with relative `.md` links and
//! relative image paths. At render time those destinations are rewritten
//! onto the server's `/page/` and `/media/` routes, resolved against the
//! directory of the document being rendered. External, fragment-only, and
//! already-routed destinations pass through untouched.

use crate::paths::clean_relative;

/// Rewrite a link destination, or `None` to leave it unchanged.
///
/// Only relative (or root-relative) `.md` destinations are rewritten.
pub fn rewrite_link(dest: &str, current_dir: &str) -> Option<String> {
    if dest.is_empty()
        || is_external(dest)
        || dest.starts_with('#')
        || dest.starts_with("/page/")
    {
        return None;
    }
    if !dest.ends_with(".md") {
        return None;
    }
    Some(format!("/page/{}", normalize_wiki_path(dest, current_dir)))
}

/// Rewrite an image destination, or `None` to leave it unchanged.
pub fn rewrite_image(dest: &str, current_dir: &str) -> Option<String> {
    if dest.is_empty()
        || is_external(dest)
        || dest.starts_with("/media/")
        || dest.starts_with("/static/")
    {
        return None;
    }
    Some(format!("/media/{}", normalize_wiki_path(dest, current_dir)))
}

fn is_external(dest: &str) -> bool {
    dest.starts_with("http://") || dest.starts_with("https://") || dest.contains("://")
}

/// Join a relative destination with the current document's directory and
/// clean the result. Root-relative destinations only lose their leading
/// slash.
fn normalize_wiki_path(dest: &str, current_dir: &str) -> String {
    if let Some(rooted) = dest.strip_prefix('/') {
        return rooted.to_string();
    }
    if current_dir.is_empty() {
        clean_relative(dest)
    } else {
        clean_relative(&format!("{current_dir}/{dest}"))
    }
}
