//! Throwaway documents for evaluating one submission's markup and styles.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use scraper::{ElementRef, Html, Selector};
use thiserror::Error;

use coursegrade_core::model::{is_markup_file, is_style_file, FileMap};

use crate::style::StyleResolver;

/// A query selector that could not be parsed.
#[derive(Debug, Clone, Error)]
#[error("invalid selector `{selector}`: {reason}")]
pub struct SelectorError {
    pub selector: String,
    pub reason: String,
}

/// Hands out sandboxes and counts the ones still alive.
#[derive(Debug, Default)]
pub struct SandboxManager {
    live: Arc<AtomicUsize>,
    next_id: AtomicU64,
}

impl SandboxManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles acquired and not yet released.
    pub fn live_handles(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Build a sandbox for a submission's files.
    ///
    /// Never fails: malformed markup is repaired by the parser, and a
    /// submission without markup yields an empty body.
    pub fn acquire(&self, files: &FileMap) -> SandboxHandle {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let markup_file = markup_file(files);
        let source = Html::parse_document(markup_file.map(|(_, m)| m.as_str()).unwrap_or(""));

        let mut styles: Vec<String> = files
            .iter()
            .filter(|(name, _)| is_style_file(name))
            .map(|(_, css)| css.clone())
            .collect();
        styles.extend(style_elements(&source, "head style"));
        styles.extend(style_elements(&source, "body style"));

        let document = Html::parse_document(&rerender_body(&source));
        let resolver = StyleResolver::new(styles.iter().map(String::as_str));

        self.live.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(
            sandbox = id,
            markup = markup_file.map(|(name, _)| name.as_str()).unwrap_or("<none>"),
            style_sources = styles.len(),
            "acquired sandbox"
        );

        SandboxHandle {
            id,
            document,
            resolver,
            _live: LiveGuard(Arc::clone(&self.live)),
        }
    }

    /// Release a handle. Dropping it has the same effect.
    pub fn release(&self, handle: SandboxHandle) {
        tracing::debug!(sandbox = handle.id, "released sandbox");
        drop(handle);
    }
}

/// Decrements the live count when the owning handle goes away.
#[derive(Debug)]
struct LiveGuard(Arc<AtomicUsize>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// One sandboxed document with its bound style resolver.
#[derive(Debug)]
pub struct SandboxHandle {
    id: u64,
    document: Html,
    resolver: StyleResolver,
    _live: LiveGuard,
}

impl SandboxHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn document(&self) -> &Html {
        &self.document
    }

    /// First element matching `selector` in document order.
    pub fn query(&self, selector: &str) -> Result<Option<ElementRef<'_>>, SelectorError> {
        let parsed = Selector::parse(selector).map_err(|e| SelectorError {
            selector: selector.to_string(),
            reason: e.to_string(),
        })?;
        Ok(self.document.select(&parsed).next())
    }

    /// Computed value of a CSS property for an element of this document.
    pub fn computed_style(&self, element: ElementRef<'_>, property: &str) -> String {
        self.resolver.computed_value(element, property)
    }
}

/// `index.html` if present, otherwise the first markup file by name.
fn markup_file(files: &FileMap) -> Option<(&String, &String)> {
    files
        .get_key_value("index.html")
        .or_else(|| files.iter().find(|(name, _)| is_markup_file(name)))
}

fn style_elements(document: &Html, selector: &str) -> Vec<String> {
    let Ok(selector) = Selector::parse(selector) else {
        return Vec::new();
    };
    document
        .select(&selector)
        .map(|el| el.text().collect::<String>())
        .collect()
}

/// A fresh document holding only the source's body, attributes included.
fn rerender_body(source: &Html) -> String {
    let body = Selector::parse("body")
        .ok()
        .and_then(|selector| source.select(&selector).next());

    let (attrs, inner) = match body {
        Some(body) => {
            let attrs: String = body
                .value()
                .attrs()
                .map(|(name, value)| format!(" {name}=\"{}\"", escape_attr(value)))
                .collect();
            (attrs, body.inner_html())
        }
        None => (String::new(), String::new()),
    };

    format!("<!DOCTYPE html><html><head></head><body{attrs}>{inner}</body></html>")
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(entries: &[(&str, &str)]) -> FileMap {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn handles_are_counted_until_released() {
        let manager = SandboxManager::new();
        let a = manager.acquire(&files(&[("index.html", "<p>a</p>")]));
        let b = manager.acquire(&files(&[]));
        assert_eq!(manager.live_handles(), 2);
        assert_ne!(a.id(), b.id());

        manager.release(a);
        assert_eq!(manager.live_handles(), 1);
        drop(b);
        assert_eq!(manager.live_handles(), 0);
    }

    #[test]
    fn handle_is_released_on_panic() {
        let manager = SandboxManager::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _handle = manager.acquire(&files(&[("index.html", "<p>a</p>")]));
            panic!("validation blew up");
        }));
        assert!(result.is_err());
        assert_eq!(manager.live_handles(), 0);
    }

    #[test]
    fn prefers_index_html() {
        let manager = SandboxManager::new();
        let handle = manager.acquire(&files(&[
            ("about.html", "<h1>About</h1>"),
            ("index.html", "<h1>Home</h1>"),
        ]));
        let h1 = handle.query("h1").unwrap().unwrap();
        assert_eq!(h1.text().collect::<String>(), "Home");

        let handle = manager.acquire(&files(&[("b.htm", "<h2>B</h2>"), ("a.html", "<h2>A</h2>")]));
        let h2 = handle.query("h2").unwrap().unwrap();
        assert_eq!(h2.text().collect::<String>(), "A");
    }

    #[test]
    fn malformed_markup_still_builds() {
        let manager = SandboxManager::new();
        let handle = manager.acquire(&files(&[(
            "index.html",
            "<div class=card><p>unclosed <b>bold</div><li>stray",
        )]));
        assert!(handle.query(".card p b").unwrap().is_some());
        assert!(handle.query("li").unwrap().is_some());
    }

    #[test]
    fn query_reports_invalid_selectors() {
        let manager = SandboxManager::new();
        let handle = manager.acquire(&files(&[("index.html", "<p>a</p>")]));
        let err = handle.query("p[").unwrap_err();
        assert_eq!(err.selector, "p[");
        assert!(handle.query("section").unwrap().is_none());
    }

    #[test]
    fn body_is_rerendered_without_head() {
        let manager = SandboxManager::new();
        let handle = manager.acquire(&files(&[(
            "index.html",
            r#"<html><head><title>T</title></head><body class="dark"><p>x</p></body></html>"#,
        )]));
        assert!(handle.query("title").unwrap().is_none());
        assert!(handle.query("body.dark > p").unwrap().is_some());
    }

    #[test]
    fn styles_cascade_from_files_then_head_then_body() {
        let manager = SandboxManager::new();
        let handle = manager.acquire(&files(&[
            (
                "index.html",
                "<head><style>h1 { color: green } p { color: green }</style></head>\
                 <body><h1>t</h1><p>p</p><style>p { color: blue }</style></body>",
            ),
            ("style.css", "h1 { color: red; font-size: 32px } p { color: red }"),
        ]));
        let h1 = handle.query("h1").unwrap().unwrap();
        let p = handle.query("p").unwrap().unwrap();
        assert_eq!(handle.computed_style(h1, "color"), "rgb(0, 128, 0)");
        assert_eq!(handle.computed_style(h1, "font-size"), "32px");
        assert_eq!(handle.computed_style(p, "color"), "rgb(0, 0, 255)");
    }
}
