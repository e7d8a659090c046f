//! Server-rendered HTML: the page shell and HTMX fragments.
//!
//! The layout is an embedded template filled by placeholder replacement;
//! fragments (tree, page, search results) are built directly in code and
//! reused for both full-page renders and HTMX swap responses.

use crate::render::RenderedDocument;
use crate::search::SearchResult;
use crate::tree::{NodeKind, TreeNode};

/// Full-page layout template.
const LAYOUT_TEMPLATE: &str = include_str!("../../assets/templates/layout.html");

/// Data for a full-page shell render.
pub struct ShellView<'a> {
    pub tree: Option<&'a TreeNode>,
    pub active_path: &'a str,
    pub title: &'a str,
    pub content: String,
    pub dark: bool,
    pub custom_css_count: usize,
}

/// Render the full HTML shell around a content fragment.
pub fn shell(view: &ShellView<'_>) -> String {
    let tree_fragment = view
        .tree
        .map(|root| tree(root, view.active_path))
        .unwrap_or_default();
    let custom_css: String = (0..view.custom_css_count)
        .map(|i| format!("<link rel=\"stylesheet\" href=\"/custom-theme/{i}\">\n    "))
        .collect();
    let wiki_name = view
        .tree
        .map(|root| root.name.as_str())
        .filter(|name| !name.is_empty())
        .unwrap_or("wiki");

    LAYOUT_TEMPLATE
        .replace("{theme}", if view.dark { "dark" } else { "light" })
        .replace("{title}", &escape(view.title))
        .replace("{custom_css}", &custom_css)
        .replace("{active}", &escape(view.active_path))
        .replace("{wiki_name}", &escape(wiki_name))
        .replace("{tree}", &tree_fragment)
        .replace("{content}", &view.content)
}

/// Navigation tree fragment. The root node itself is not rendered, only
/// its children.
pub fn tree(root: &TreeNode, active: &str) -> String {
    let mut out = String::from("<ul class=\"tree-list\">\n");
    for child in &root.children {
        tree_node(child, active, &mut out);
    }
    out.push_str("</ul>\n");
    out
}

fn tree_node(node: &TreeNode, active: &str, out: &mut String) {
    match node.kind {
        NodeKind::Directory => {
            out.push_str(&format!(
                "<li class=\"dir\"><details open><summary>{}</summary>\n<ul>\n",
                escape(&node.title)
            ));
            for child in &node.children {
                tree_node(child, active, out);
            }
            out.push_str("</ul>\n</details></li>\n");
        }
        NodeKind::File => {
            let class = if node.relative_path.eq_ignore_ascii_case(active) {
                " class=\"active\""
            } else {
                ""
            };
            out.push_str(&format!(
                "<li class=\"file\"><a{class} href=\"/page/{}\" data-path=\"{}\">{}</a></li>\n",
                escape(&node.relative_path),
                escape(&node.relative_path),
                escape(&node.title)
            ));
        }
    }
}

/// Rendered document fragment with breadcrumbs.
pub fn page(path: &str, doc: &RenderedDocument, tree: Option<&TreeNode>) -> String {
    let title = if doc.metadata.title.is_empty() {
        title_from_path(path)
    } else {
        doc.metadata.title.clone()
    };
    let crumbs = tree.map(|root| breadcrumbs(root, path)).unwrap_or_default();

    format!(
        "<header class=\"page-header\">{crumbs}<h1 class=\"page-title\">{}</h1></header>\n{}",
        escape(&title),
        doc.html
    )
}

/// Fragment shown when a document does not exist.
pub fn missing_page(path: &str) -> String {
    format!(
        "<div class=\"page-missing\">Document <code>{}</code> was not found.</div>",
        escape(path)
    )
}

/// Search results fragment.
pub fn search(query: &str, results: &[SearchResult]) -> String {
    let mut out = format!(
        "<div class=\"search-summary\">{} result(s) for <strong>{}</strong></div>\n<ul class=\"search-hits\">\n",
        results.len(),
        escape(query)
    );
    for result in results {
        out.push_str(&format!(
            "<li><a href=\"/page/{path}\"><span class=\"hit-path\">{path}:{line}</span> <span class=\"hit-text\">{text}</span></a></li>\n",
            path = escape(&result.path),
            line = result.line,
            text = escape(&result.line_text)
        ));
    }
    out.push_str("</ul>\n");
    out
}

/// Breadcrumb trail for a document, skipping the root node and leaving the
/// final crumb unlinked.
fn breadcrumbs(root: &TreeNode, path: &str) -> String {
    let chain = root.path_to(path);
    if chain.len() <= 1 {
        return String::new();
    }

    let mut out = String::from("<nav class=\"breadcrumbs\">");
    let nodes = &chain[1..];
    for (i, node) in nodes.iter().enumerate() {
        if i > 0 {
            out.push_str("<span class=\"sep\">/</span>");
        }
        let title = if node.title.is_empty() {
            title_from_path(&node.relative_path)
        } else {
            node.title.clone()
        };
        let is_last = i == nodes.len() - 1;
        if node.kind == NodeKind::File && !is_last {
            out.push_str(&format!(
                "<a href=\"/page/{}\">{}</a>",
                escape(&node.relative_path),
                escape(&title)
            ));
        } else {
            out.push_str(&format!("<span>{}</span>", escape(&title)));
        }
    }
    out.push_str("</nav>");
    out
}

/// Derive a human title from a path: base name, separators to spaces,
/// words capitalized.
pub fn title_from_path(path: &str) -> String {
    let base = path.rsplit('/').next().unwrap_or(path);
    let base = match base.rfind('.') {
        Some(idx) if idx > 0 => &base[..idx],
        _ => base,
    };
    let cleaned = base.replace(['-', '_'], " ");
    let words: Vec<String> = cleaned
        .split_whitespace()
        .map(|word| {
            let lower = word.to_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect();
    if words.is_empty() {
        return "Untitled Document".to_string();
    }
    words.join(" ")
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}
