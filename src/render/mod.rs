//! Markdown rendering with per-document caching.
//!
//! The [`Renderer`] owns a concurrent cache keyed by wiki-relative path.
//! A cache hit requires the stored modification time to equal the
//! caller-supplied one exactly; there is no TTL and no fuzzy matching.
//! Concurrent renders of the same path are permitted and benign: entries
//! are last-writer-wins and the cache converges.

mod d2;
mod frontmatter;
mod highlight;
mod links;
mod markdown;

pub use frontmatter::Metadata;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;

/// A rendered markdown file. Immutable once produced.
#[derive(Debug)]
pub struct RenderedDocument {
    pub html: String,
    pub raw: String,
    pub metadata: Metadata,
    pub modified: DateTime<Utc>,
}

struct CacheEntry {
    modified: DateTime<Utc>,
    doc: Arc<RenderedDocument>,
}

/// Renders markdown into HTML with caching, GitHub-flavored extensions,
/// syntax highlighting, and wiki link rewriting.
pub struct Renderer {
    cache: DashMap<String, CacheEntry>,
    highlighter: highlight::Highlighter,
    d2: Option<d2::D2Compiler>,
}

impl Renderer {
    pub fn new() -> Self {
        Self {
            cache: DashMap::new(),
            highlighter: highlight::Highlighter::new(),
            d2: d2::D2Compiler::detect(),
        }
    }

    /// Render a document, reusing the cached value when the modification
    /// time matches exactly.
    ///
    /// `path` is the wiki-relative path; it keys the cache and resolves
    /// relative links.
    pub fn render(&self, path: &str, modified: DateTime<Utc>, content: &str) -> Arc<RenderedDocument> {
        if let Some(entry) = self.cache.get(path)
            && entry.modified == modified
        {
            return Arc::clone(&entry.doc);
        }

        let (metadata, body) = frontmatter::extract(content);
        let html = markdown::to_html(body, path, &self.highlighter, self.d2.as_ref());
        let doc = Arc::new(RenderedDocument {
            html,
            raw: content.to_string(),
            metadata,
            modified,
        });

        self.cache.insert(
            path.to_string(),
            CacheEntry {
                modified,
                doc: Arc::clone(&doc),
            },
        );
        doc
    }

    /// Drop the cached entry for a path unconditionally.
    pub fn invalidate(&self, path: &str) {
        self.cache.remove(path);
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_cache_hit_on_equal_mtime() {
        let renderer = Renderer::new();
        let first = renderer.render("a.md", at(100), "# Old");
        // Same path and mtime: the stale cached value wins over new content.
        let second = renderer.render("a.md", at(100), "# New");
        assert_eq!(first.html, second.html);
        assert!(second.html.contains("Old"));
    }

    #[test]
    fn test_cache_miss_on_new_mtime() {
        let renderer = Renderer::new();
        renderer.render("a.md", at(100), "# Old");
        let updated = renderer.render("a.md", at(101), "# New");
        assert!(updated.html.contains("New"));
    }

    #[test]
    fn test_invalidate_forces_rerender() {
        let renderer = Renderer::new();
        renderer.render("a.md", at(100), "# Old");
        renderer.invalidate("a.md");
        let updated = renderer.render("a.md", at(100), "# New");
        assert!(updated.html.contains("New"));
    }

    #[test]
    fn test_paths_are_independent_cache_keys() {
        let renderer = Renderer::new();
        renderer.render("a.md", at(100), "# A");
        let b = renderer.render("b.md", at(100), "# B");
        assert!(b.html.contains("B"));
    }

    #[test]
    fn test_metadata_and_raw_carried() {
        let renderer = Renderer::new();
        let doc = renderer.render("a.md", at(1), "---\ntitle: Hello\n---\n# Body\n");
        assert_eq!(doc.metadata.title, "Hello");
        assert!(doc.raw.starts_with("---"));
        assert!(doc.html.contains("Body"));
        assert!(!doc.html.contains("title: Hello"));
    }
}
