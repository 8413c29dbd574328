//! HTML to plain text conversion.
//!
//! Article bodies arrive as HTML. Before storage they are flattened into
//! plain text with paragraph breaks preserved, and a word count is derived
//! from that text. The word count is always recomputed from the normalized
//! text, never taken from the platform.

use scraper::{ElementRef, Html};

/// Subtrees whose text is never part of the article.
const SKIPPED_ELEMENTS: &[&str] = &[
    "script", "style", "noscript", "template", "svg", "iframe", "head",
];

/// Elements rendered as their own paragraph.
const BLOCK_ELEMENTS: &[&str] = &[
    "p",
    "div",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "li",
    "ul",
    "ol",
    "blockquote",
    "pre",
    "figure",
    "figcaption",
    "table",
    "tr",
    "section",
    "article",
    "hr",
];

/// Converts raw HTML into plain text.
///
/// The ingest pipeline only depends on this trait so tests can substitute a
/// deterministic fake.
pub trait Normalizer: Send + Sync {
    fn to_text(&self, html: &str) -> String;
}

/// Default [`Normalizer`] backed by the `scraper` HTML parser.
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlNormalizer;

impl Normalizer for HtmlNormalizer {
    fn to_text(&self, html: &str) -> String {
        if html.trim().is_empty() {
            return String::new();
        }
        let fragment = Html::parse_fragment(html);
        let mut raw = String::with_capacity(html.len() / 2);
        collect_text(fragment.root_element(), &mut raw);
        tidy_whitespace(&raw)
    }
}

/// Normalized text plus its word count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedContent {
    pub text: String,
    pub word_count: i64,
}

/// Run `normalizer` over `html` and count the words of the result.
pub fn normalize(normalizer: &dyn Normalizer, html: &str) -> NormalizedContent {
    let text = normalizer.to_text(html);
    let word_count = word_count(&text);
    NormalizedContent { text, word_count }
}

/// Number of whitespace-separated tokens.
pub fn word_count(text: &str) -> i64 {
    text.split_whitespace().count() as i64
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
            continue;
        }
        let Some(el) = ElementRef::wrap(child) else {
            continue;
        };
        let name = el.value().name();
        if SKIPPED_ELEMENTS.contains(&name) {
            continue;
        }
        if name == "br" {
            out.push('\n');
            continue;
        }
        let block = BLOCK_ELEMENTS.contains(&name);
        if block {
            out.push_str("\n\n");
        }
        collect_text(el, out);
        if block {
            out.push_str("\n\n");
        }
    }
}

/// Collapse horizontal whitespace, trim lines, and keep at most one blank
/// line between paragraphs.
fn tidy_whitespace(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_blank = false;

    for line in raw.split('\n') {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            pending_blank = true;
            continue;
        }
        if !out.is_empty() {
            out.push_str(if pending_blank { "\n\n" } else { "\n" });
        }
        out.push_str(&collapsed);
        pending_blank = false;
    }

    out
}
