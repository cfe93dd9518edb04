//! Content normalization.
//!
//! Turns a note's raw markup into plain text, markdown and the inline tag list.
//! Parsing is best effort: html5ever repairs whatever markup it is given, so
//! normalization never fails.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{node::Node, ElementRef, Html};
use serde::{Deserialize, Serialize};

static TAG_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"#([^\s#]+)").unwrap());
static EXCESS_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Derived, immutable view of a note's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedContent {
    pub plain_text: String,
    pub markdown: String,
    /// Inline tags found in the raw markup, duplicates kept
    pub tags: Vec<String>,
    /// Character count of `plain_text`
    pub word_count: usize,
}

/// Normalizes one note's raw markup.
pub fn normalize(raw: &str) -> NormalizedContent {
    let fragment = Html::parse_fragment(raw);
    let root = fragment.root_element();

    let plain_text = plain_text(root);
    let word_count = plain_text.chars().count();

    NormalizedContent {
        markdown: markdown(root),
        tags: extract_tags(raw),
        word_count,
        plain_text,
    }
}

/// Every `#` followed by a run of non-whitespace, non-`#` characters, in order.
pub fn extract_tags(raw: &str) -> Vec<String> {
    TAG_PATTERN
        .captures_iter(raw)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Text nodes, each trimmed, empty ones dropped, one per line.
fn plain_text(root: ElementRef<'_>) -> String {
    root.text()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn markdown(root: ElementRef<'_>) -> String {
    let mut writer = MarkdownWriter::default();
    writer.children(root);
    let collapsed = EXCESS_BLANK_LINES.replace_all(&writer.out, "\n\n");
    collapsed
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

#[derive(Default)]
struct MarkdownWriter {
    out: String,
    preformatted: bool,
}

impl MarkdownWriter {
    fn nested(&self) -> Self {
        Self {
            out: String::new(),
            preformatted: self.preformatted,
        }
    }

    fn children(&mut self, element: ElementRef<'_>) {
        for child in element.children() {
            match child.value() {
                Node::Text(text) => self.text(text),
                Node::Element(_) => {
                    if let Some(child) = ElementRef::wrap(child) {
                        self.element(child);
                    }
                }
                _ => {}
            }
        }
    }

    /// Renders `element`'s children on their own, for wrapping or prefixing.
    fn render_inner(&self, element: ElementRef<'_>) -> String {
        let mut inner = self.nested();
        inner.children(element);
        inner.out
    }

    fn text(&mut self, text: &str) {
        if self.preformatted {
            self.out.push_str(text);
            return;
        }

        // HTML whitespace collapses to a single space.
        let mut last_was_space = self.out.is_empty() || self.out.ends_with([' ', '\n']);
        for c in text.chars() {
            if c.is_whitespace() {
                if !last_was_space {
                    self.out.push(' ');
                    last_was_space = true;
                }
            } else {
                self.out.push(c);
                last_was_space = false;
            }
        }
    }

    fn block_break(&mut self) {
        let trimmed = self.out.trim_end_matches(' ').len();
        self.out.truncate(trimmed);
        if self.out.is_empty() {
            return;
        }
        while !self.out.ends_with("\n\n") {
            self.out.push('\n');
        }
    }

    fn inline_wrap(&mut self, element: ElementRef<'_>, marker: &str) {
        let inner = self.render_inner(element);
        let trimmed = inner.trim();
        if trimmed.is_empty() {
            self.out.push_str(&inner);
            return;
        }
        if inner.starts_with(' ') {
            self.text(" ");
        }
        self.out.push_str(marker);
        self.out.push_str(trimmed);
        self.out.push_str(marker);
        if inner.ends_with(' ') {
            self.out.push(' ');
        }
    }

    fn element(&mut self, element: ElementRef<'_>) {
        let name = element.value().name();
        match name {
            "p" | "div" | "section" | "article" | "header" | "footer" => {
                self.block_break();
                self.children(element);
                self.block_break();
            }
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = name[1..].parse::<usize>().unwrap_or(1);
                self.block_break();
                self.out.push_str(&"#".repeat(level));
                self.out.push(' ');
                let inner = self.render_inner(element);
                self.out.push_str(inner.trim());
                self.block_break();
            }
            "br" => {
                let trimmed = self.out.trim_end_matches(' ').len();
                self.out.truncate(trimmed);
                self.out.push('\n');
            }
            "hr" => {
                self.block_break();
                self.out.push_str("* * *");
                self.block_break();
            }
            "strong" | "b" => self.inline_wrap(element, "**"),
            "em" | "i" => self.inline_wrap(element, "_"),
            "s" | "del" | "strike" => self.inline_wrap(element, "~~"),
            "code" if !self.preformatted => self.inline_wrap(element, "`"),
            "pre" => {
                self.block_break();
                let mut inner = self.nested();
                inner.preformatted = true;
                inner.children(element);
                self.out.push_str("```\n");
                self.out.push_str(inner.out.trim_matches('\n'));
                self.out.push_str("\n```");
                self.block_break();
            }
            "a" => {
                let label = self.render_inner(element);
                let label = label.trim();
                match element.value().attr("href") {
                    Some(href) if !href.is_empty() => {
                        let label = if label.is_empty() { href } else { label };
                        self.out.push_str(&format!("[{}]({})", label, href));
                    }
                    _ => self.text(label),
                }
            }
            "img" => {
                if let Some(src) = element.value().attr("src") {
                    let alt = element.value().attr("alt").unwrap_or("");
                    self.out.push_str(&format!("![{}]({})", alt, src));
                }
            }
            "ul" | "ol" => {
                self.block_break();
                self.list(element, name == "ol");
                self.block_break();
            }
            "blockquote" => {
                self.block_break();
                let inner = self.render_inner(element);
                let quoted = inner
                    .trim()
                    .lines()
                    .map(|line| {
                        if line.is_empty() {
                            ">".to_string()
                        } else {
                            format!("> {}", line)
                        }
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                self.out.push_str(&quoted);
                self.block_break();
            }
            "script" | "style" | "head" | "title" => {}
            _ => self.children(element),
        }
    }

    fn list(&mut self, list: ElementRef<'_>, ordered: bool) {
        let items = list
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|child| child.value().name() == "li");

        let mut rendered = Vec::new();
        for (index, item) in items.enumerate() {
            let marker = if ordered {
                format!("{}. ", index + 1)
            } else {
                "* ".to_string()
            };
            let indent = " ".repeat(marker.len());

            let inner = self.render_inner(item);
            let inner = EXCESS_BLANK_LINES.replace_all(inner.trim(), "\n\n");
            let body = inner
                .lines()
                .filter(|line| !line.trim().is_empty())
                .enumerate()
                .map(|(i, line)| {
                    if i == 0 {
                        format!("{}{}", marker, line)
                    } else {
                        format!("{}{}", indent, line)
                    }
                })
                .collect::<Vec<_>>()
                .join("\n");
            rendered.push(if body.is_empty() {
                marker.trim_end().to_string()
            } else {
                body
            });
        }

        self.out.push_str(&rendered.join("\n"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_stop_at_whitespace_or_hash() {
        assert_eq!(
            extract_tags("hello #foo bar #foo-bar! #baz"),
            vec!["foo", "foo-bar!", "baz"]
        );
        assert_eq!(extract_tags("#a#b #a"), vec!["a", "b", "a"]);
        assert!(extract_tags("no tags # here").is_empty());
    }

    #[test]
    fn test_tags_come_from_raw_markup() {
        let normalized = normalize("<p>#reading/books great</p><p>#idea</p>");
        assert_eq!(normalized.tags, vec!["reading/books", "idea</p>"]);
    }

    #[test]
    fn test_plain_text_puts_text_nodes_on_lines() {
        let normalized = normalize("<p>First line</p><p>  Second <strong>bold</strong> part </p>");
        assert_eq!(normalized.plain_text, "First line\nSecond\nbold\npart");
        assert_eq!(
            normalized.word_count,
            normalized.plain_text.chars().count()
        );
    }

    #[test]
    fn test_word_count_counts_characters() {
        let normalized = normalize("<p>夕阳很美</p>");
        assert_eq!(normalized.plain_text, "夕阳很美");
        assert_eq!(normalized.word_count, 4);
    }

    #[test]
    fn test_markdown_structure() {
        let html = "<p>Intro with <strong>bold</strong> and <em>soft</em> text.</p>\
                    <ul><li>one</li><li>two <a href=\"https://flomoapp.com\">link</a></li></ul>\
                    <ol><li>first</li><li>second</li></ol>\
                    <blockquote><p>quoted</p></blockquote>";
        let md = normalize(html).markdown;
        assert_eq!(
            md,
            "Intro with **bold** and _soft_ text.\n\n\
             * one\n* two [link](https://flomoapp.com)\n\n\
             1. first\n2. second\n\n\
             > quoted"
        );
    }

    #[test]
    fn test_markdown_line_breaks_and_code() {
        let md = normalize("<p>a<br>b <code>x = 1</code></p><pre>fn main() {\n    run();\n}</pre>")
            .markdown;
        assert_eq!(md, "a\nb `x = 1`\n\n```\nfn main() {\n    run();\n}\n```");
    }

    #[test]
    fn test_nested_list_is_indented() {
        let md = normalize("<ul><li>parent<ul><li>child</li></ul></li></ul>").markdown;
        assert_eq!(md, "* parent\n  * child");
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let html = "<p>Same <b>input</b> #tag</p><ul><li>x</li></ul>";
        let first = normalize(html);
        let second = normalize(html);
        assert_eq!(first, second);
    }

    #[test]
    fn test_malformed_markup_degrades_gracefully() {
        let normalized = normalize("<p>unclosed <strong>bold<li>stray</p></div>");
        assert!(normalized.plain_text.contains("unclosed"));
        assert!(normalized.plain_text.contains("stray"));
        assert!(!normalized.markdown.is_empty());
    }

    #[test]
    fn test_plain_input_passes_through() {
        let normalized = normalize("  just text #note  ");
        assert_eq!(normalized.plain_text, "just text #note");
        assert_eq!(normalized.markdown, "just text #note");
        assert_eq!(normalized.tags, vec!["note"]);
    }

    #[test]
    fn test_empty_input() {
        let normalized = normalize("");
        assert_eq!(normalized.plain_text, "");
        assert_eq!(normalized.markdown, "");
        assert!(normalized.tags.is_empty());
        assert_eq!(normalized.word_count, 0);
    }
}
