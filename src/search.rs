//! Ripgrep-backed full-text search across markdown files.
//!
//! Each query spawns one `rg --json` child process rooted at the wiki
//! directory and parses its newline-delimited JSON output. Exit code 1
//! ("no matches") is success with an empty result list; any other nonzero
//! exit propagates as an error carrying stderr.

use crate::error::WikiError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

/// Controls the behavior of a ripgrep invocation.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOptions {
    pub case_sensitive: bool,
    pub context: usize,
    pub include_globs: Vec<String>,
    pub exclude_globs: Vec<String>,
    pub search_hidden: bool,
}

/// A single match reported by ripgrep.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SearchResult {
    pub path: String,
    #[serde(rename = "match")]
    pub matched: String,
    #[serde(rename = "lineText")]
    pub line_text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub before: Vec<LineSnippet>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub after: Vec<LineSnippet>,
    pub line: u64,
    pub column: usize,
}

/// A contextual line around a match.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LineSnippet {
    pub text: String,
    pub line: u64,
}

/// Executes ripgrep searches rooted at the wiki directory.
pub struct SearchService {
    root: PathBuf,
}

impl SearchService {
    /// Construct the search service, failing fast when no `rg` binary is
    /// available on PATH.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, WikiError> {
        let root = root.into();
        let probe = std::process::Command::new("rg")
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        if !probe.is_ok_and(|status| status.success()) {
            return Err(WikiError::Internal(
                "ripgrep executable not found in PATH".to_string(),
            ));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Run a query. The child process is killed if the caller's future is
    /// dropped (request cancelled).
    pub async fn search(
        &self,
        query: &str,
        opts: &SearchOptions,
    ) -> Result<Vec<SearchResult>, WikiError> {
        if query.trim().is_empty() {
            return Err(WikiError::InvalidPayload("query cannot be empty".into()));
        }

        let output = tokio::process::Command::new("rg")
            .args(build_args(query, opts))
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| WikiError::Internal(format!("start rg: {e}")))?;

        let results = parse_rg_json(&output.stdout, opts)?;

        match output.status.code() {
            Some(0) | Some(1) => Ok(results),
            code => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(WikiError::Internal(format!(
                    "rg error (exit {}): {}",
                    code.map_or_else(|| "signal".to_string(), |c| c.to_string()),
                    stderr.trim()
                )))
            }
        }
    }
}

fn build_args(query: &str, opts: &SearchOptions) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "--json".into(),
        "--line-number".into(),
        "--color=never".into(),
        "--no-heading".into(),
    ];
    if opts.case_sensitive {
        args.push("--case-sensitive".into());
    } else {
        args.push("--smart-case".into());
    }
    if opts.context > 0 {
        args.push("-C".into());
        args.push(opts.context.to_string());
    }
    for glob in &opts.include_globs {
        let glob = glob.trim();
        if !glob.is_empty() {
            args.push("--glob".into());
            args.push(glob.to_string());
        }
    }
    for glob in &opts.exclude_globs {
        let glob = glob.trim();
        if glob.is_empty() {
            continue;
        }
        args.push("--glob".into());
        if glob.starts_with('!') {
            args.push(glob.to_string());
        } else {
            args.push(format!("!{glob}"));
        }
    }
    if opts.search_hidden {
        args.push("--hidden".into());
    }
    args.push("--".into());
    args.push(query.to_string());
    args.push("./".into());
    args
}

#[derive(Deserialize)]
struct RgMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Deserialize)]
struct RgMatch {
    path: RgText,
    lines: RgText,
    line_number: u64,
    #[serde(default)]
    submatches: Vec<RgSubmatch>,
}

#[derive(Deserialize)]
struct RgContext {
    path: RgText,
    lines: RgText,
    line_number: u64,
}

#[derive(Deserialize)]
struct RgText {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct RgSubmatch {
    #[serde(rename = "match")]
    matched: RgText,
    start: usize,
}

/// Parse ripgrep's NDJSON output. Context lines are collected per file
/// first, then stitched onto each match so both before and after snippets
/// resolve regardless of stream order.
fn parse_rg_json(stdout: &[u8], opts: &SearchOptions) -> Result<Vec<SearchResult>, WikiError> {
    let text = String::from_utf8_lossy(stdout);
    let mut matches: Vec<RgMatch> = Vec::new();
    let mut context_lines: HashMap<String, HashMap<u64, String>> = HashMap::new();

    for line in text.lines().filter(|line| !line.trim().is_empty()) {
        let message: RgMessage = serde_json::from_str(line)
            .map_err(|e| WikiError::Internal(format!("decode ripgrep output: {e}")))?;
        match message.kind.as_str() {
            "match" => {
                let m: RgMatch = serde_json::from_value(message.data)
                    .map_err(|e| WikiError::Internal(format!("decode match: {e}")))?;
                matches.push(m);
            }
            "context" if opts.context > 0 => {
                let c: RgContext = serde_json::from_value(message.data)
                    .map_err(|e| WikiError::Internal(format!("decode context: {e}")))?;
                context_lines
                    .entry(c.path.text)
                    .or_default()
                    .insert(c.line_number, trim_newline(&c.lines.text));
            }
            _ => {}
        }
    }

    let results = matches
        .into_iter()
        .map(|m| {
            let mut result = SearchResult {
                path: m.path.text,
                matched: String::new(),
                line_text: trim_newline(&m.lines.text),
                before: Vec::new(),
                after: Vec::new(),
                line: m.line_number,
                column: 0,
            };
            if let Some(sub) = m.submatches.first() {
                result.matched = sub.matched.text.clone();
                result.column = sub.start + 1;
            }
            if opts.context > 0
                && let Some(lines) = context_lines.get(&result.path)
            {
                for i in (1..=opts.context as u64).rev() {
                    if let Some(line) = m.line_number.checked_sub(i)
                        && let Some(text) = lines.get(&line)
                    {
                        result.before.push(LineSnippet {
                            text: text.clone(),
                            line,
                        });
                    }
                }
                for i in 1..=opts.context as u64 {
                    let line = m.line_number + i;
                    if let Some(text) = lines.get(&line) {
                        result.after.push(LineSnippet {
                            text: text.clone(),
                            line,
                        });
                    }
                }
            }
            result
        })
        .collect();

    Ok(results)
}

fn trim_newline(text: &str) -> String {
    text.trim_end_matches('\n').trim_end_matches('\r').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MATCH_LINE: &str = r#"{"type":"match","data":{"path":{"text":"guides/home.md"},"lines":{"text":"Welcome home\n"},"line_number":2,"absolute_offset":10,"submatches":[{"match":{"text":"Welcome"},"start":0,"end":7}]}}"#;

    #[test]
    fn test_parse_match() {
        let opts = SearchOptions::default();
        let results = parse_rg_json(MATCH_LINE.as_bytes(), &opts).unwrap();
        assert_eq!(results.len(), 1);
        let r = &results[0];
        assert_eq!(r.path, "guides/home.md");
        assert_eq!(r.line_text, "Welcome home");
        assert_eq!(r.line, 2);
        assert_eq!(r.column, 1);
        assert_eq!(r.matched, "Welcome");
    }

    #[test]
    fn test_parse_context_stitching() {
        let stream = [
            r#"{"type":"begin","data":{"path":{"text":"guides/home.md"}}}"#,
            r##"{"type":"context","data":{"path":{"text":"guides/home.md"},"lines":{"text":"# Title\n"},"line_number":1,"absolute_offset":0,"submatches":[]}}"##,
            MATCH_LINE,
            r#"{"type":"context","data":{"path":{"text":"guides/home.md"},"lines":{"text":"Goodbye\n"},"line_number":3,"absolute_offset":24,"submatches":[]}}"#,
            r#"{"type":"end","data":{"path":{"text":"guides/home.md"}}}"#,
        ]
        .join("\n");

        let opts = SearchOptions {
            context: 1,
            ..Default::default()
        };
        let results = parse_rg_json(stream.as_bytes(), &opts).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(
            results[0].before,
            vec![LineSnippet {
                text: "# Title".into(),
                line: 1
            }]
        );
        assert_eq!(
            results[0].after,
            vec![LineSnippet {
                text: "Goodbye".into(),
                line: 3
            }]
        );
    }

    #[test]
    fn test_context_ignored_when_not_requested() {
        let stream = [
            r#"{"type":"context","data":{"path":{"text":"a.md"},"lines":{"text":"ctx\n"},"line_number":1,"absolute_offset":0,"submatches":[]}}"#,
            MATCH_LINE,
        ]
        .join("\n");
        let results = parse_rg_json(stream.as_bytes(), &SearchOptions::default()).unwrap();
        assert!(results[0].before.is_empty());
        assert!(results[0].after.is_empty());
    }

    #[test]
    fn test_empty_output_is_empty_results() {
        let results = parse_rg_json(b"", &SearchOptions::default()).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_garbage_output_errors() {
        assert!(parse_rg_json(b"not json\n", &SearchOptions::default()).is_err());
    }

    #[test]
    fn test_build_args_defaults() {
        let args = build_args("hello", &SearchOptions::default());
        assert!(args.contains(&"--json".to_string()));
        assert!(args.contains(&"--smart-case".to_string()));
        assert!(!args.contains(&"--hidden".to_string()));
        // Query sits after the flag terminator.
        let sep = args.iter().position(|a| a == "--").unwrap();
        assert_eq!(args[sep + 1], "hello");
        assert_eq!(args[sep + 2], "./");
    }

    #[test]
    fn test_build_args_options() {
        let opts = SearchOptions {
            case_sensitive: true,
            context: 2,
            include_globs: vec!["*.md".into(), "  ".into()],
            exclude_globs: vec!["drafts/*".into(), "!tmp/*".into()],
            search_hidden: true,
        };
        let args = build_args("q", &opts);
        assert!(args.contains(&"--case-sensitive".to_string()));
        assert!(!args.contains(&"--smart-case".to_string()));
        let c = args.iter().position(|a| a == "-C").unwrap();
        assert_eq!(args[c + 1], "2");
        assert!(args.contains(&"*.md".to_string()));
        // Exclusions gain the negation prefix exactly once.
        assert!(args.contains(&"!drafts/*".to_string()));
        assert!(args.contains(&"!tmp/*".to_string()));
        assert!(args.contains(&"--hidden".to_string()));
    }

    #[tokio::test]
    async fn test_search_no_matches_is_empty_ok() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "nothing to see").unwrap();
        let Ok(service) = SearchService::new(dir.path()) else {
            // rg unavailable in this environment; constructor contract
            // covered elsewhere.
            return;
        };
        let results = service
            .search("zzz-no-such-token-zzz", &SearchOptions::default())
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_search_finds_line_with_context() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("home.md"), "# Title\nWelcome home\nGoodbye\n").unwrap();
        let Ok(service) = SearchService::new(dir.path()) else {
            return;
        };
        let opts = SearchOptions {
            context: 1,
            include_globs: vec!["*.md".into()],
            ..Default::default()
        };
        let results = service.search("Welcome", &opts).await.unwrap();
        assert!(!results.is_empty());
        let r = &results[0];
        assert_eq!(r.line, 2);
        assert!(!r.before.is_empty());
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let dir = tempfile::tempdir().unwrap();
        if let Ok(service) = SearchService::new(dir.path()) {
            let err = service.search("   ", &SearchOptions::default()).await;
            assert!(matches!(err, Err(WikiError::InvalidPayload(_))));
        }
    }
}
