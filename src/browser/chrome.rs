//! Headless Chrome implementation of [`BrowserSession`].

use std::collections::HashMap;
use std::ffi::OsStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use headless_chrome::{Browser, Element as ChromeElement, LaunchOptions, Tab};
use scraper::{Html, Selector};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{BrowserSession, Element, WaitKind};
use crate::config::HarvestConfig;
use crate::error::SessionError;

const VISIBILITY_POLL: Duration = Duration::from_millis(250);

/// Serializes an element (attributes with resolved href/src, rendered text, visibility) to JSON.
const SNAPSHOT_FN: &str = r#"
    function() {
        const attributes = {};
        for (const attr of this.attributes) { attributes[attr.name] = attr.value; }
        if (this.href) { attributes.href = this.href; }
        if (this.currentSrc || this.src) { attributes.src = this.currentSrc || this.src; }
        const rect = this.getBoundingClientRect();
        const style = window.getComputedStyle(this);
        const visible = rect.width > 0 && rect.height > 0
            && style.visibility !== 'hidden' && style.display !== 'none';
        return JSON.stringify({
            text: this.innerText || this.textContent || '',
            attributes,
            visible,
        });
    }
"#;

#[derive(Deserialize)]
struct Snapshot {
    #[serde(flatten)]
    element: Element,
    #[serde(default)]
    visible: bool,
}

pub struct ChromeSession {
    // Dropping the browser kills the Chrome process.
    _browser: Browser,
    tab: Arc<Tab>,
    closed: AtomicBool,
}

impl ChromeSession {
    pub fn launch(config: &HarvestConfig) -> anyhow::Result<Self> {
        let ua_arg = format!("--user-agent={}", config.user_agent);
        let mut args = vec![
            OsStr::new("--disable-blink-features=AutomationControlled"),
            OsStr::new("--no-sandbox"),
            OsStr::new("--disable-dev-shm-usage"),
            OsStr::new("--disable-extensions"),
            OsStr::new("--disable-popup-blocking"),
            OsStr::new(&ua_arg),
        ];
        if config.headless {
            args.push(OsStr::new("--headless=new"));
        }

        let browser = Browser::new(LaunchOptions {
            headless: false, // Use new headless mode via args
            window_size: Some((1920, 1080)),
            idle_browser_timeout: Duration::from_secs(600),
            args,
            ..Default::default()
        })?;
        let tab = browser.new_tab()?;
        tab.set_default_timeout(config.nav_timeout);
        debug!("Launched Chrome session (headless: {})", config.headless);

        Ok(Self {
            _browser: browser,
            tab,
            closed: AtomicBool::new(false),
        })
    }

    fn snapshot(&self, element: &ChromeElement<'_>) -> Result<Snapshot, SessionError> {
        let result = element
            .call_js_fn(SNAPSHOT_FN, vec![], false)
            .map_err(classify_error)?;
        match result.value {
            Some(serde_json::Value::String(json)) => serde_json::from_str(&json)
                .map_err(|e| SessionError::Operation(format!("bad element snapshot: {}", e))),
            other => Err(SessionError::Operation(format!(
                "element snapshot returned {:?}",
                other
            ))),
        }
    }
}

impl BrowserSession for ChromeSession {
    fn navigate(&self, url: &str) -> Result<(), SessionError> {
        debug!("Navigating to: {}", url);
        self.tab.navigate_to(url).map_err(classify_error)?;
        self.tab.wait_until_navigated().map_err(classify_error)?;
        Ok(())
    }

    fn find_one(
        &self,
        selector: &str,
        wait: WaitKind,
        timeout: Duration,
    ) -> Result<Option<Element>, SessionError> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.tab.wait_for_element_with_custom_timeout(selector, remaining) {
                Ok(found) => {
                    let snapshot = self.snapshot(&found)?;
                    if wait == WaitKind::Presence || snapshot.visible {
                        return Ok(Some(snapshot.element));
                    }
                }
                Err(e) => {
                    let err = classify_error(e);
                    if err.is_fatal() {
                        return Err(err);
                    }
                    // Not present before the deadline
                    return Ok(None);
                }
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            // Trait waits are blocking; this parks the caller's thread between polls.
            std::thread::sleep(VISIBILITY_POLL);
        }
    }

    fn find_all(&self, selector: &str) -> Result<Vec<Element>, SessionError> {
        let parsed = Selector::parse(selector).map_err(|e| SessionError::Selector {
            selector: selector.to_string(),
            reason: e.to_string(),
        })?;
        let html = self.tab.get_content().map_err(classify_error)?;
        let document = Html::parse_document(&html);

        Ok(document
            .select(&parsed)
            .map(|el| {
                let attributes: HashMap<String, String> = el
                    .value()
                    .attrs()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect();
                Element::new(el.text().collect::<String>(), attributes)
            })
            .collect())
    }

    fn execute_script(&self, script: &str) -> Result<Option<serde_json::Value>, SessionError> {
        let result = self.tab.evaluate(script, false).map_err(classify_error)?;
        Ok(result.value)
    }

    fn current_url(&self) -> Result<String, SessionError> {
        Ok(self.tab.get_url())
    }

    fn close(&self) -> Result<(), SessionError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.tab.close(true).map_err(classify_error)?;
        debug!("Chrome session closed");
        Ok(())
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("⚠️ Failed to close browser tab cleanly: {}", e);
        }
    }
}

fn classify_error(e: anyhow::Error) -> SessionError {
    let message = e.to_string();
    let lowered = message.to_lowercase();
    if lowered.contains("connection is closed")
        || lowered.contains("connectionclosed")
        || lowered.contains("browser process")
        || lowered.contains("target closed")
    {
        SessionError::Fatal(message)
    } else {
        SessionError::Operation(message)
    }
}
