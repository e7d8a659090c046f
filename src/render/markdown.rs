//! Markdown to HTML conversion.
//!
//! Drives pulldown-cmark with GitHub-flavored extensions and runs two
//! passes over the event stream before emitting HTML:
//!
//! 1. a structural pass that assigns heading ids, appends anchor links
//!    after heading text, and routes fenced code blocks to the
//!    highlighter / mermaid wrapper / D2 compiler;
//! 2. a destination pass that rewrites link and image targets onto the
//!    `/page/` and `/media/` routes.
//!
//! Raw HTML passes through untouched; content is trusted in a local-only
//! wiki.

use crate::paths::parent_dir;
use crate::render::d2::{self, D2Compiler};
use crate::render::highlight::Highlighter;
use crate::render::links::{rewrite_image, rewrite_link};
use pulldown_cmark::{CodeBlockKind, CowStr, Event, Options, Parser, Tag, TagEnd};
use std::collections::HashMap;

/// Convert a markdown body (frontmatter already stripped) into HTML.
///
/// `wiki_path` is the slash-normalized path of the document being
/// rendered; relative links resolve against its directory.
pub fn to_html(
    body: &str,
    wiki_path: &str,
    highlighter: &Highlighter,
    d2: Option<&D2Compiler>,
) -> String {
    let options = Options::ENABLE_TABLES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_HEADING_ATTRIBUTES;

    let events = structural_pass(Parser::new_ext(body, options), highlighter, d2);
    let events = destination_pass(events, parent_dir(wiki_path));

    let mut html = String::with_capacity(body.len() * 3 / 2);
    pulldown_cmark::html::push_html(&mut html, events.into_iter());
    html
}

/// Heading ids and fenced code block replacement.
fn structural_pass<'a>(
    parser: Parser<'a>,
    highlighter: &Highlighter,
    d2: Option<&D2Compiler>,
) -> Vec<Event<'a>> {
    let mut events = Vec::new();
    let mut slugs = SlugDeduper::default();
    let mut iter = parser.into_iter();

    while let Some(event) = iter.next() {
        match event {
            Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(lang))) => {
                let mut code = String::new();
                for inner in iter.by_ref() {
                    match inner {
                        Event::End(TagEnd::CodeBlock) => break,
                        Event::Text(text) => code.push_str(&text),
                        _ => {}
                    }
                }
                events.push(Event::Html(
                    render_fence(&lang, &code, highlighter, d2).into(),
                ));
            }
            Event::Start(Tag::Heading {
                level,
                id,
                classes,
                attrs,
            }) => {
                let mut inner = Vec::new();
                let mut text = String::new();
                for event in iter.by_ref() {
                    match event {
                        Event::End(TagEnd::Heading(_)) => break,
                        other => {
                            if let Event::Text(t) | Event::Code(t) = &other {
                                text.push_str(t);
                            }
                            inner.push(other);
                        }
                    }
                }

                // An explicit `{#id}` attribute wins over the generated slug.
                let id = id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| slugs.slug(&text));
                events.push(Event::Start(Tag::Heading {
                    level,
                    id: Some(id.clone().into()),
                    classes,
                    attrs,
                }));
                events.extend(inner);
                events.push(Event::Html(
                    format!("<a class=\"anchor\" href=\"#{id}\" aria-hidden=\"true\">#</a>").into(),
                ));
                events.push(Event::End(TagEnd::Heading(level)));
            }
            other => events.push(other),
        }
    }

    events
}

/// Link and image destination rewriting.
fn destination_pass<'a>(events: Vec<Event<'a>>, current_dir: &str) -> Vec<Event<'a>> {
    events
        .into_iter()
        .map(|event| match event {
            Event::Start(Tag::Link {
                link_type,
                dest_url,
                title,
                id,
            }) => {
                let dest_url = match rewrite_link(&dest_url, current_dir) {
                    Some(rewritten) => rewritten.into(),
                    None => dest_url,
                };
                Event::Start(Tag::Link {
                    link_type,
                    dest_url,
                    title,
                    id,
                })
            }
            Event::Start(Tag::Image {
                link_type,
                dest_url,
                title,
                id,
            }) => {
                let dest_url = match rewrite_image(&dest_url, current_dir) {
                    Some(rewritten) => rewritten.into(),
                    None => dest_url,
                };
                Event::Start(Tag::Image {
                    link_type,
                    dest_url,
                    title,
                    id,
                })
            }
            other => other,
        })
        .collect()
}

/// Render a fenced code block by language: mermaid fences become hydration
/// divs, d2 fences compile to SVG, everything else goes through the
/// highlighter with an escaped fallback.
fn render_fence(
    lang: &CowStr<'_>,
    code: &str,
    highlighter: &Highlighter,
    d2: Option<&D2Compiler>,
) -> String {
    let normalized = lang.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "mermaid" => format!("<div class=\"mermaid\">{}</div>\n", escape_html(code)),
        "d2" => d2::render_block(d2, code),
        "" => format!("<pre><code>{}</code></pre>\n", escape_html(code)),
        lang => match highlighter.highlight(lang, code) {
            Some(highlighted) => format!(
                "<pre><code class=\"language-{lang}\">{highlighted}</code></pre>\n"
            ),
            None => format!(
                "<pre><code class=\"language-{lang}\">{}</code></pre>\n",
                escape_html(code)
            ),
        },
    }
}

/// Minimal HTML escaping for text interpolated into hand-built markup.
pub(crate) fn escape_html(text: &str) -> String {
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

/// GitHub-style heading id generation with duplicate suffixes.
#[derive(Default)]
struct SlugDeduper {
    seen: HashMap<String, usize>,
}

impl SlugDeduper {
    fn slug(&mut self, text: &str) -> String {
        let base: String = text
            .trim()
            .to_lowercase()
            .chars()
            .filter_map(|ch| match ch {
                'a'..='z' | '0'..='9' | '_' | '-' => Some(ch),
                ' ' => Some('-'),
                _ => None,
            })
            .collect();
        let base = if base.is_empty() {
            "section".to_string()
        } else {
            base
        };

        let count = self.seen.entry(base.clone()).or_insert(0);
        let slug = if *count == 0 {
            base.clone()
        } else {
            format!("{base}-{count}")
        };
        *count += 1;
        slug
    }
}
