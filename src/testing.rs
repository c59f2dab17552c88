//! Test doubles: a scripted browser over static HTML and a canned media fetcher.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use serde_json::json;

use crate::browser::{BrowserSession, Element, WaitKind};
use crate::error::SessionError;
use crate::media::{FetchedMedia, MediaFetcher};

/// One page of the fake site. Lazy fragments are appended to the body once the
/// page has received at least `after` scroll calls.
#[derive(Debug, Clone, Default)]
pub struct FakePage {
    title: String,
    body: String,
    lazy: Vec<(u32, String)>,
    scroll_height: u64,
}

impl FakePage {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            scroll_height: 900,
            ..Default::default()
        }
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    pub fn lazy_after(mut self, scroll_calls: u32, fragment: impl Into<String>) -> Self {
        self.lazy.push((scroll_calls, fragment.into()));
        self
    }

    pub fn scroll_height(mut self, px: u64) -> Self {
        self.scroll_height = px;
        self
    }

    fn render(&self, scroll_calls: u32) -> String {
        let revealed: String = self
            .lazy
            .iter()
            .filter(|(after, _)| *after <= scroll_calls)
            .map(|(_, fragment)| fragment.as_str())
            .collect();
        format!(
            "<html><head><title>{}</title></head><body>{}{}</body></html>",
            self.title, self.body, revealed
        )
    }
}

#[derive(Default)]
struct FakeState {
    current: Option<String>,
    scroll_calls: u32,
    probes: Vec<String>,
    navigations: Vec<String>,
    fail_once: Vec<String>,
    closed: bool,
}

#[derive(Default)]
pub struct FakeBrowser {
    pages: HashMap<String, FakePage>,
    failing: HashSet<String>,
    fatal: HashSet<String>,
    state: Mutex<FakeState>,
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, page: FakePage) -> Self {
        self.pages.insert(url.to_string(), page);
        self
    }

    /// Navigating to `url` fails with a recoverable error.
    pub fn failing_on(mut self, url: &str) -> Self {
        self.failing.insert(url.to_string());
        self
    }

    /// Navigating to `url` kills the session.
    pub fn fatal_on(mut self, url: &str) -> Self {
        self.fatal.insert(url.to_string());
        self
    }

    /// The next `find_one`, `find_all` or `execute_script` call whose selector or
    /// script contains `needle` fails with a recoverable error.
    pub fn fail_once(self, needle: &str) -> Self {
        self.state.lock().unwrap().fail_once.push(needle.to_string());
        self
    }

    fn injected_failure(&self, arg: &str) -> Result<(), SessionError> {
        let mut state = self.state.lock().unwrap();
        match state.fail_once.iter().position(|n| arg.contains(n.as_str())) {
            Some(idx) => {
                let needle = state.fail_once.remove(idx);
                Err(SessionError::Operation(format!("injected failure on {}", needle)))
            }
            None => Ok(()),
        }
    }

    /// Selectors passed to `find_one`, in call order.
    pub fn probes(&self) -> Vec<String> {
        self.state.lock().unwrap().probes.clone()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().unwrap().navigations.clone()
    }

    pub fn scroll_calls(&self) -> u32 {
        self.state.lock().unwrap().scroll_calls
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    fn rendered(&self) -> Option<(String, FakePage)> {
        let state = self.state.lock().unwrap();
        let url = state.current.as_ref()?;
        let page = self.pages.get(url).cloned().unwrap_or_default();
        Some((page.render(state.scroll_calls), page))
    }

    fn select(&self, selector: &str) -> Result<Vec<Element>, SessionError> {
        let parsed = Selector::parse(selector).map_err(|e| SessionError::Selector {
            selector: selector.to_string(),
            reason: e.to_string(),
        })?;
        let Some((html, _)) = self.rendered() else {
            return Ok(Vec::new());
        };
        let document = Html::parse_document(&html);
        Ok(document.select(&parsed).map(snapshot).collect())
    }
}

fn snapshot(el: ElementRef<'_>) -> Element {
    let attributes = el
        .value()
        .attrs()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Element::new(el.text().collect::<String>(), attributes)
}

impl BrowserSession for FakeBrowser {
    fn navigate(&self, url: &str) -> Result<(), SessionError> {
        if self.fatal.contains(url) {
            return Err(SessionError::Fatal(format!("connection closed while loading {}", url)));
        }
        if self.failing.contains(url) {
            return Err(SessionError::Operation(format!("net::ERR_FAILED {}", url)));
        }
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(SessionError::Fatal("session already closed".into()));
        }
        state.navigations.push(url.to_string());
        state.current = Some(url.to_string());
        state.scroll_calls = 0;
        Ok(())
    }

    fn find_one(
        &self,
        selector: &str,
        _wait: WaitKind,
        _timeout: Duration,
    ) -> Result<Option<Element>, SessionError> {
        self.state.lock().unwrap().probes.push(selector.to_string());
        self.injected_failure(selector)?;
        Ok(self.select(selector)?.into_iter().next())
    }

    fn find_all(&self, selector: &str) -> Result<Vec<Element>, SessionError> {
        self.injected_failure(selector)?;
        self.select(selector)
    }

    fn execute_script(&self, script: &str) -> Result<Option<serde_json::Value>, SessionError> {
        self.injected_failure(script)?;
        if script.contains("scrollTo") || script.contains("scrollBy") {
            self.state.lock().unwrap().scroll_calls += 1;
            return Ok(None);
        }
        let page = self.rendered().map(|(_, page)| page).unwrap_or_default();
        if script.contains("scrollHeight") {
            return Ok(Some(json!(page.scroll_height)));
        }
        if script.contains("document.title") {
            return Ok(Some(json!(page.title)));
        }
        Ok(None)
    }

    fn current_url(&self) -> Result<String, SessionError> {
        Ok(self.state.lock().unwrap().current.clone().unwrap_or_default())
    }

    fn close(&self) -> Result<(), SessionError> {
        self.state.lock().unwrap().closed = true;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum FakeResponse {
    Body {
        status: u16,
        content_type: Option<String>,
        body: Vec<u8>,
    },
    NetworkError(String),
}

impl FakeResponse {
    pub fn image(content_type: &str, body: &[u8]) -> Self {
        FakeResponse::Body {
            status: 200,
            content_type: Some(content_type.to_string()),
            body: body.to_vec(),
        }
    }

    pub fn status(status: u16) -> Self {
        FakeResponse::Body {
            status,
            content_type: Some("text/html".to_string()),
            body: b"error".to_vec(),
        }
    }
}

#[derive(Default)]
pub struct FakeFetcher {
    responses: HashMap<String, FakeResponse>,
    hits: Mutex<HashMap<String, usize>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, response: FakeResponse) -> Self {
        self.responses.insert(url.to_string(), response);
        self
    }

    pub fn hits(&self, url: &str) -> usize {
        self.hits.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn total_hits(&self) -> usize {
        self.hits.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl MediaFetcher for FakeFetcher {
    async fn fetch(&self, url: &str, _timeout: Duration) -> anyhow::Result<FetchedMedia> {
        *self.hits.lock().unwrap().entry(url.to_string()).or_insert(0) += 1;
        match self.responses.get(url).cloned().unwrap_or(FakeResponse::status(404)) {
            FakeResponse::Body {
                status,
                content_type,
                body,
            } => Ok(FetchedMedia {
                status,
                content_type,
                body,
            }),
            FakeResponse::NetworkError(reason) => Err(anyhow::anyhow!(reason)),
        }
    }
}
