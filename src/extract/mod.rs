//! HTML and JSON record extraction.
//!
//! Every field is resolved by a short cascade of strategies; the first one
//! that yields a value wins.

pub mod api;
pub mod detail;
pub mod list;

use scraper::{ElementRef, Selector};
use url::Url;

use crate::config::BASE_URL;

pub(crate) fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("Invalid CSS selector")
}

/// Text content with whitespace runs collapsed to single spaces.
pub(crate) fn element_text(el: ElementRef) -> String {
    collapse_whitespace(&el.text().collect::<String>())
}

/// Trimmed, non-empty text nodes joined with `sep`.
pub(crate) fn joined_text(el: ElementRef, sep: &str) -> String {
    el.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(sep)
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Non-empty value of an attribute.
pub(crate) fn attr<'a>(el: ElementRef<'a>, name: &str) -> Option<&'a str> {
    el.value()
        .attr(name)
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

pub(crate) fn has_class(el: ElementRef, class: &str) -> bool {
    el.value().classes().any(|c| c == class)
}

pub(crate) fn non_empty(text: String) -> Option<String> {
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Resolve a possibly relative href against the site root.
pub fn absolutize(href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    Url::parse(BASE_URL)
        .and_then(|base| base.join(href))
        .map(String::from)
        .unwrap_or_else(|_| href.to_string())
}
