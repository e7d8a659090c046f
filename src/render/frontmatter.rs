//! YAML frontmatter extraction.
//!
//! A frontmatter block is a YAML mapping delimited by `---` lines at the
//! very top of a document. Well-known keys (`title`, `description`/
//! `summary`, `tags`/`keywords`) are lifted into typed fields; everything
//! else is preserved verbatim under `raw`.

use serde::Serialize;
use std::collections::BTreeMap;

/// Optional frontmatter data rendered alongside a document.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Metadata {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub raw: BTreeMap<String, serde_json::Value>,
}

impl Metadata {
    /// Whether the metadata carries any meaningful values.
    pub fn is_empty(&self) -> bool {
        self.title.is_empty()
            && self.description.is_empty()
            && self.tags.is_empty()
            && self.raw.is_empty()
    }
}

/// Split frontmatter from a document, returning the extracted metadata and
/// the markdown body.
///
/// A block that fails to parse as a YAML mapping is not treated as
/// frontmatter: the full content is returned as the body and renders
/// literally.
pub fn extract(content: &str) -> (Metadata, &str) {
    let Some((block, body)) = split(content) else {
        return (Metadata::default(), content);
    };

    let Ok(mapping) = serde_yaml::from_str::<serde_yaml::Mapping>(block) else {
        return (Metadata::default(), content);
    };

    let mut meta = Metadata::default();
    for (key, value) in &mapping {
        let Some(key) = key.as_str() else { continue };
        if let Ok(json) = serde_json::to_value(value) {
            meta.raw.insert(key.to_string(), json);
        }
        match key {
            "title" => {
                if let Some(s) = to_string_value(value) {
                    meta.title = s;
                }
            }
            "description" | "summary" => {
                if let Some(s) = to_string_value(value) {
                    meta.description = s;
                }
            }
            "tags" | "keywords" => meta.tags = to_string_list(value),
            _ => {}
        }
    }

    (meta, body)
}

/// Locate the frontmatter block. Returns `(yaml, body)` when the document
/// opens with a `---` line and a closing `---` line exists.
fn split(content: &str) -> Option<(&str, &str)> {
    let rest = content.strip_prefix("---")?;
    let rest = rest.strip_prefix('\n').or_else(|| rest.strip_prefix("\r\n"))?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if matches!(line.trim_end(), "---" | "...") {
            let block = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return Some((block, body));
        }
        offset += line.len();
    }
    None
}

/// Render a scalar YAML value as a string; mappings and sequences are not
/// stringifiable.
fn to_string_value(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Tags accept a sequence of stringifiable values or a single value.
fn to_string_list(value: &serde_yaml::Value) -> Vec<String> {
    match value {
        serde_yaml::Value::Sequence(items) => items.iter().filter_map(to_string_value).collect(),
        other => to_string_value(other).map(|s| vec![s]).unwrap_or_default(),
    }
}
