//! Navigation tree construction.
//!
//! Walks the wiki root and produces a hierarchical snapshot of directories
//! and markdown files for the sidebar and breadcrumb UI. The walk is
//! all-or-nothing: any stat, read, or render failure aborts the build so a
//! partial tree is never published.

use crate::error::WikiError;
use crate::render::{Metadata, Renderer};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Directory names skipped during the walk, case-insensitive.
const DEFAULT_EXCLUDED_DIRS: &[&str] = &[
    "node_modules",
    "vendor",
    "venv",
    ".venv",
    "deps",
    "third_party",
    ".git",
    ".hg",
    ".svn",
    ".idea",
    ".vscode",
    "__pycache__",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Directory,
    File,
}

/// A navigation entry (directory or markdown file).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    pub name: String,
    pub raw_name: String,
    pub relative_path: String,
    pub slug: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub title: String,
    pub modified: DateTime<Utc>,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    /// Depth-first search for the first markdown file in the tree.
    pub fn first_document(&self) -> Option<&str> {
        if self.kind == NodeKind::File {
            return Some(&self.relative_path);
        }
        self.children.iter().find_map(TreeNode::first_document)
    }

    /// The chain of nodes from the root to the node at `target`
    /// (case-insensitive path match), or an empty slice when absent.
    pub fn path_to(&self, target: &str) -> Vec<&TreeNode> {
        if self.relative_path.eq_ignore_ascii_case(target) {
            return vec![self];
        }
        for child in &self.children {
            let tail = child.path_to(target);
            if !tail.is_empty() {
                let mut chain = vec![self];
                chain.extend(tail);
                return chain;
            }
        }
        Vec::new()
    }
}

/// Options controlling tree construction.
#[derive(Debug, Clone, Default)]
pub struct TreeOptions {
    pub include_hidden: bool,
    pub exclude_dirs: Vec<String>,
}

/// Walk `root` and build a navigation tree of markdown content.
pub fn build(root: &Path, renderer: &Renderer, opts: &TreeOptions) -> Result<TreeNode, WikiError> {
    let meta = fs::metadata(root).map_err(|e| WikiError::io("stat root", root, e))?;
    if !meta.is_dir() {
        return Err(WikiError::Internal(format!(
            "root {} is not a directory",
            root.display()
        )));
    }

    let mut exclude: HashSet<String> = DEFAULT_EXCLUDED_DIRS
        .iter()
        .map(|name| name.to_ascii_lowercase())
        .collect();
    exclude.extend(
        opts.exclude_dirs
            .iter()
            .map(|name| name.trim().to_ascii_lowercase())
            .filter(|name| !name.is_empty()),
    );

    let builder = Builder {
        renderer,
        exclude,
        include_hidden: opts.include_hidden,
    };
    builder
        .build_dir(root, "")
        .map(|node| node.expect("root directory is never pruned"))
}

struct Builder<'a> {
    renderer: &'a Renderer,
    exclude: HashSet<String>,
    include_hidden: bool,
}

impl Builder<'_> {
    fn is_excluded(&self, name: &str) -> bool {
        self.exclude.contains(&name.to_ascii_lowercase())
    }

    /// Build a directory node. Returns `None` when a non-root directory
    /// contains no markdown anywhere below it.
    fn build_dir(&self, abs: &Path, rel: &str) -> Result<Option<TreeNode>, WikiError> {
        let entries = fs::read_dir(abs).map_err(|e| WikiError::io("read dir", abs, e))?;

        let mut children = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| WikiError::io("read dir", abs, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !self.include_hidden && name.starts_with('.') {
                continue;
            }

            let child_abs = entry.path();
            let child_rel = if rel.is_empty() {
                name.clone()
            } else {
                format!("{rel}/{name}")
            };

            let file_type = entry
                .file_type()
                .map_err(|e| WikiError::io("stat file", &child_abs, e))?;

            if file_type.is_dir() {
                if self.is_excluded(&name) {
                    continue;
                }
                if let Some(node) = self.build_dir(&child_abs, &child_rel)? {
                    children.push(node);
                }
                continue;
            }

            if !crate::paths::is_markdown(&name) {
                continue;
            }
            children.push(self.build_file(&child_abs, &child_rel, &name)?);
        }

        if children.is_empty() && !rel.is_empty() {
            return Ok(None);
        }

        children.sort_by(|a, b| {
            if a.kind == b.kind {
                a.title.cmp(&b.title)
            } else {
                // Directories sort before files.
                (a.kind == NodeKind::File).cmp(&(b.kind == NodeKind::File))
            }
        });

        let meta = fs::metadata(abs).map_err(|e| WikiError::io("stat directory", abs, e))?;
        let modified = meta
            .modified()
            .map_err(|e| WikiError::io("stat directory", abs, e))?;

        let raw_name = if rel.is_empty() {
            abs.file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default()
        } else {
            base_name(rel).to_string()
        };
        let display = if rel.is_empty() {
            raw_name.clone()
        } else {
            display_name(&raw_name)
        };

        Ok(Some(TreeNode {
            name: display.clone(),
            raw_name,
            relative_path: rel.to_string(),
            slug: slugify(rel),
            kind: NodeKind::Directory,
            title: display,
            modified: modified.into(),
            size: 0,
            metadata: None,
            children,
        }))
    }

    fn build_file(&self, abs: &Path, rel: &str, name: &str) -> Result<TreeNode, WikiError> {
        let meta = fs::metadata(abs).map_err(|e| WikiError::io("stat file", abs, e))?;
        let modified: DateTime<Utc> = meta
            .modified()
            .map_err(|e| WikiError::io("stat file", abs, e))?
            .into();
        let content =
            fs::read_to_string(abs).map_err(|e| WikiError::io("read file", abs, e))?;

        // The render warms the cache and yields frontmatter; the HTML is
        // not used at tree-build time.
        let doc = self.renderer.render(rel, modified, &content);

        let display = display_name(name);
        let title = if doc.metadata.title.is_empty() {
            display.clone()
        } else {
            doc.metadata.title.clone()
        };
        let metadata = (!doc.metadata.is_empty()).then(|| doc.metadata.clone());

        Ok(TreeNode {
            name: display,
            raw_name: name.to_string(),
            relative_path: rel.to_string(),
            slug: slugify(strip_extension(rel)),
            kind: NodeKind::File,
            title,
            modified,
            size: meta.len(),
            metadata,
            children: Vec::new(),
        })
    }
}

fn base_name(rel: &str) -> &str {
    rel.rsplit('/').next().unwrap_or(rel)
}

fn strip_extension(path: &str) -> &str {
    match path.rfind('.') {
        Some(idx) if idx > path.rfind('/').map_or(0, |s| s + 1) => &path[..idx],
        _ => path,
    }
}

/// Extension stripped, underscores to spaces, trimmed.
fn display_name(name: &str) -> String {
    strip_extension(name).replace('_', " ").trim().to_string()
}

/// Lowercased, per-component, spaces to hyphens.
fn slugify(path: &str) -> String {
    path.split('/')
        .map(|part| {
            strip_extension(part)
                .replace('_', " ")
                .trim()
                .to_lowercase()
                .replace(' ', "-")
        })
        .collect::<Vec<_>>()
        .join("/")
}
