//! Readable-content extraction from raw HTML
//!
//! This implementation:
//! - Uses scraper crate for HTML parsing with CSS selectors
//! - Uses htmd for HTML to Markdown conversion
//! - Strips boilerplate (nav/header/footer/ads) and, unless asked to keep
//!   them, comment regions
//!
//! No network access: callers supply the HTML. The page URL is only used
//! as a title fallback.

use scraper::{Html, Selector};
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Extraction failure. Retrying the same input cannot help, so jobs that
/// hit this fail outright.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("no readable content in page")]
    NoReadableContent,
}

/// Result of extracting one page.
#[derive(Debug, Clone)]
pub struct ExtractedPage {
    pub title: Option<String>,
    pub text: String,
}

/// HTML-to-text extractor using scraper + htmd.
#[derive(Default)]
pub struct PageExtractor;

impl PageExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract readable text and a title from raw HTML.
    ///
    /// `include_comments` keeps reader-comment regions in the output;
    /// by default they are stripped along with the other boilerplate.
    pub fn extract(
        &self,
        html: &str,
        page_url: &str,
        include_comments: bool,
    ) -> Result<ExtractedPage, ExtractError> {
        let document = Html::parse_document(html);

        let title = Self::extract_title(&document).or_else(|| Self::title_from_url(page_url));

        let mut content = Self::extract_main_content(&document);
        if !include_comments {
            content = Self::remove_comment_regions(&content);
        }

        let text = Self::html_to_markdown(&content);
        if text.trim().is_empty() {
            return Err(ExtractError::NoReadableContent);
        }

        debug!(
            page_url = %page_url,
            text_len = text.len(),
            has_title = title.is_some(),
            "Extracted page content"
        );

        Ok(ExtractedPage { title, text })
    }

    /// Extract title from HTML document
    fn extract_title(document: &Html) -> Option<String> {
        let title_selector = Selector::parse("title").ok()?;
        document
            .select(&title_selector)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty())
    }

    /// Derive a title from the URL (host + path) when the page has none.
    fn title_from_url(page_url: &str) -> Option<String> {
        let url = Url::parse(page_url).ok()?;
        let host = url.host_str()?;
        let path = url.path().trim_end_matches('/');
        if path.is_empty() {
            Some(host.to_string())
        } else {
            Some(format!("{}{}", host, path))
        }
    }

    /// Extract main content HTML, stripping nav/header/footer/aside
    fn extract_main_content(document: &Html) -> String {
        // Try to find main content area
        let main_selectors = [
            "main",
            "article",
            "[role='main']",
            "#content",
            "#main",
            ".content",
            ".main",
            ".post-content",
            ".entry-content",
        ];

        for selector_str in main_selectors {
            if let Ok(selector) = Selector::parse(selector_str) {
                if let Some(main) = document.select(&selector).next() {
                    return main.html();
                }
            }
        }

        // Fallback: use body but remove unwanted elements
        if let Ok(body_selector) = Selector::parse("body") {
            if let Some(body) = document.select(&body_selector).next() {
                let html = body.html();
                return Self::remove_boilerplate(&html);
            }
        }

        // Last resort: return entire document
        document.html()
    }

    /// Remove common boilerplate elements from HTML string
    fn remove_boilerplate(html: &str) -> String {
        let document = Html::parse_document(html);
        let unwanted = [
            "nav",
            "header",
            "footer",
            "aside",
            ".nav",
            ".navbar",
            ".header",
            ".footer",
            ".sidebar",
            ".menu",
            ".advertisement",
            ".ads",
            "#nav",
            "#header",
            "#footer",
            "#sidebar",
            "script",
            "style",
            "noscript",
            "iframe",
        ];

        let mut result = html.to_string();
        for selector_str in unwanted {
            if let Ok(selector) = Selector::parse(selector_str) {
                for element in document.select(&selector) {
                    let element_html = element.html();
                    result = result.replace(&element_html, "");
                }
            }
        }

        result
    }

    /// Remove reader-comment regions from HTML string
    fn remove_comment_regions(html: &str) -> String {
        let document = Html::parse_document(html);
        let comment_regions = [
            "#comments",
            ".comments",
            ".comment-list",
            ".comment-section",
            "#disqus_thread",
        ];

        let mut result = html.to_string();
        for selector_str in comment_regions {
            if let Ok(selector) = Selector::parse(selector_str) {
                for element in document.select(&selector) {
                    let element_html = element.html();
                    result = result.replace(&element_html, "");
                }
            }
        }

        result
    }

    /// Convert HTML to Markdown
    fn html_to_markdown(html: &str) -> String {
        htmd::convert(html).unwrap_or_else(|_| {
            // Fallback: strip tags and return plain text
            let document = Html::parse_document(html);
            document.root_element().text().collect::<String>()
        })
    }
}
