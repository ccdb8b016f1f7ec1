//! HTML extraction: main-content detection, boilerplate removal and
//! paragraph-preserving text.

use chrono::{DateTime, NaiveDate};
use scraper::{ElementRef, Html, Node, Selector};
use tracing::debug;

use crate::error::{ExtractError, ExtractResult};
use crate::extractors::normalize::{collapse_whitespace, looks_binary};
use crate::traits::extractor::ContentExtractor;
use crate::traits::fetcher::RawContent;
use crate::types::document::{DocumentMetadata, ExtractedDocument, TextBlock};
use crate::types::fingerprint::Fingerprint;
use crate::types::source::Source;

/// Candidate containers for the main content, in priority order.
const CONTENT_SELECTORS: &[&str] = &[
    "article",
    "main",
    "[role='main']",
    ".post-content",
    ".article-content",
    ".article-body",
    ".entry-content",
    ".story-body",
    ".article__body",
    ".content-body",
    "#article-body",
    "#content",
    ".prose",
];

/// A container must hold this much prose to count as the main content.
const MIN_MAIN_CONTENT_CHARS: usize = 200;

/// Subtrees that never contain article prose.
const SKIP_TAGS: &[&str] = &[
    "nav", "header", "footer", "aside", "form", "script", "style", "noscript", "template",
    "svg", "iframe", "button", "select",
];

/// Elements whose text forms its own paragraph.
const BLOCK_TAGS: &[&str] = &[
    "p", "li", "h1", "h2", "h3", "h4", "h5", "h6", "blockquote", "pre", "td", "th", "dd", "dt",
    "div", "section", "article", "main", "tr", "figcaption", "caption", "table", "ul", "ol",
];

/// Class/id words marking ads, cookie banners, share widgets and similar.
const BOILERPLATE_WORDS: &[&str] = &[
    "ad", "ads", "advert", "advertisement", "banner", "breadcrumb", "breadcrumbs", "comments",
    "cookie", "cookies", "consent", "menu", "nav", "navbar", "newsletter", "promo", "related",
    "share", "sharing", "sidebar", "social", "subscribe",
];

/// Extractor for [`SourceKind::WebPage`](crate::types::source::SourceKind::WebPage).
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlExtractor;

impl HtmlExtractor {
    fn main_content_blocks(document: &Html) -> Vec<String> {
        for css in CONTENT_SELECTORS {
            let Some(element) = select_first(document, css) else {
                continue;
            };
            let blocks = element_blocks(element);
            let chars: usize = blocks.iter().map(|b| b.chars().count()).sum();
            if chars >= MIN_MAIN_CONTENT_CHARS {
                debug!(selector = *css, chars, "Main content container found");
                return blocks;
            }
        }

        // Fallback: the whole body, with boilerplate subtrees skipped.
        select_first(document, "body")
            .map(element_blocks)
            .unwrap_or_else(|| element_blocks(document.root_element()))
    }

    fn metadata(document: &Html, source: &Source) -> DocumentMetadata {
        let title = select_first(document, "h1")
            .map(|h| collapse_whitespace(&h.text().collect::<String>()))
            .filter(|t| !t.is_empty())
            .or_else(|| {
                select_first(document, "title")
                    .map(|t| collapse_whitespace(&t.text().collect::<String>()))
                    .filter(|t| !t.is_empty())
            })
            .or_else(|| source.metadata().title.clone());

        let author = meta_content(document, "meta[name='author']")
            .or_else(|| meta_content(document, "meta[property='article:author']"))
            .or_else(|| {
                [".author", ".byline", "[rel='author']"].iter().find_map(|css| {
                    select_first(document, css)
                        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
                        .filter(|t| !t.is_empty())
                })
            })
            .map(|a| a.trim_start_matches("By ").trim_start_matches("by ").to_string());

        let published = select_first(document, "time[datetime]")
            .and_then(|t| t.value().attr("datetime").map(str::to_string))
            .or_else(|| meta_content(document, "meta[property='article:published_time']"))
            .or_else(|| meta_content(document, "meta[name='date']"))
            .and_then(|raw| parse_date(&raw));

        DocumentMetadata {
            title,
            author,
            published,
        }
    }
}

impl ContentExtractor for HtmlExtractor {
    fn extract(&self, raw: &RawContent, source: &Source) -> ExtractResult<ExtractedDocument> {
        if looks_binary(&raw.bytes) {
            return Err(ExtractError::Corrupt(
                "binary content where HTML was expected".to_string(),
            ));
        }

        let fingerprint = Fingerprint::from_bytes(&raw.bytes);
        let html = String::from_utf8_lossy(&raw.bytes);
        let document = Html::parse_document(&html);

        let blocks: Vec<TextBlock> = Self::main_content_blocks(&document)
            .into_iter()
            .map(TextBlock::new)
            .collect();
        let metadata = Self::metadata(&document, source);

        debug!(
            locator = %source.locator(),
            blocks = blocks.len(),
            "HTML extraction completed"
        );

        Ok(ExtractedDocument::new(source.reference(), fingerprint, blocks).with_metadata(metadata))
    }

    fn name(&self) -> &'static str {
        "html"
    }
}

fn select_first<'a>(document: &'a Html, css: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(css).ok()?;
    document.select(&selector).next()
}

fn meta_content(document: &Html, css: &str) -> Option<String> {
    select_first(document, css)
        .and_then(|m| m.value().attr("content"))
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.date_naive())
        .ok()
        .or_else(|| raw.get(..10).and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()))
}

fn is_boilerplate(element: &scraper::node::Element) -> bool {
    let words = element
        .classes()
        .chain(element.id())
        .flat_map(|token| token.split(['-', '_']))
        .map(|w| w.to_ascii_lowercase());

    for word in words {
        if BOILERPLATE_WORDS.contains(&word.as_str()) {
            return true;
        }
    }
    false
}

/// Text of an element as paragraphs.
fn element_blocks(element: ElementRef<'_>) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current = String::new();
    walk(element, &mut blocks, &mut current);
    flush(&mut blocks, &mut current);
    blocks
}

fn flush(blocks: &mut Vec<String>, current: &mut String) {
    let text = collapse_whitespace(current);
    if !text.is_empty() {
        blocks.push(text);
    }
    current.clear();
}

fn walk(element: ElementRef<'_>, blocks: &mut Vec<String>, current: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => current.push_str(text),
            Node::Element(el) => {
                let name = el.name();
                if SKIP_TAGS.contains(&name) || is_boilerplate(el) {
                    continue;
                }
                if name == "br" {
                    current.push(' ');
                    continue;
                }
                let Some(child_ref) = ElementRef::wrap(child) else {
                    continue;
                };

                if BLOCK_TAGS.contains(&name) {
                    flush(blocks, current);
                    walk(child_ref, blocks, current);
                    flush(blocks, current);
                } else {
                    current.push(' ');
                    walk(child_ref, blocks, current);
                    current.push(' ');
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_article_html;

    fn extract(html: &str) -> ExtractedDocument {
        let source = Source::web_page("https://example.com/insights/q3");
        HtmlExtractor
            .extract(&RawContent::new(html.as_bytes().to_vec()), &source)
            .unwrap()
    }

    #[test]
    fn test_article_content_without_boilerplate() {
        let doc = extract(&sample_article_html());
        let text = doc.text();

        assert!(text.contains("Fixed income markets"));
        assert!(!text.contains("Subscribe to our newsletter"));
        assert!(!text.contains("Accept cookies"));
        assert!(!text.contains("Home | Funds | Insights"));
        assert!(!text.contains("trackPageView"));
    }

    #[test]
    fn test_paragraph_boundaries_are_preserved() {
        let doc = extract(
            "<html><body><p>First   paragraph\n spans lines.</p><p>Second <b>bold</b> one.</p></body></html>",
        );
        assert_eq!(doc.text(), "First paragraph spans lines.\n\nSecond bold one.");
    }

    #[test]
    fn test_metadata() {
        let doc = extract(&sample_article_html());
        let meta = doc.metadata();

        assert_eq!(meta.title.as_deref(), Some("Fixed Income Outlook: Q3"));
        assert_eq!(meta.author.as_deref(), Some("Jane Analyst"));
        assert_eq!(
            meta.published,
            Some(NaiveDate::from_ymd_opt(2024, 7, 15).unwrap())
        );
    }

    #[test]
    fn test_short_article_falls_back_to_body() {
        let doc = extract(
            "<html><body><nav>Menu</nav><article>Tiny</article><div><p>Body paragraph outside the article.</p></div></body></html>",
        );
        let text = doc.text();
        assert!(text.contains("Tiny"));
        assert!(text.contains("Body paragraph outside the article."));
        assert!(!text.contains("Menu"));
    }

    #[test]
    fn test_page_without_prose_is_empty_not_error() {
        let doc = extract("<html><head><script>var x = 1;</script></head><body><nav>Only nav</nav></body></html>");
        assert!(doc.is_empty());
    }

    #[test]
    fn test_binary_is_corrupt() {
        let source = Source::web_page("https://example.com/img");
        let err = HtmlExtractor
            .extract(&RawContent::new(vec![0x89, b'P', b'N', b'G', 0, 0, 0]), &source)
            .unwrap_err();
        assert_eq!(err.reason(), "corrupt");
    }

    #[test]
    fn test_fingerprint_is_content_derived() {
        let a = extract("<p>same</p>");
        let b = extract("<p>same</p>");
        let c = extract("<p>different</p>");
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }
}
