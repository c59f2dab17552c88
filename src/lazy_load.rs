//! Lazy-load completion detection for infinitely scrolling listing pages.
//!
//! Each round scrolls the whole page in fixed steps (lazy loaders usually fire
//! when an element nears the viewport, not on a jump to the bottom), waits for
//! the page to settle, then unions every item link currently in the DOM.
//! Discovery stops once the expected count is reached or the round cap (and
//! optional wall-clock budget) is exhausted.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::browser::{BrowserSession, WaitKind};
use crate::config::HarvestConfig;
use crate::error::{recover, SessionError};

static FIRST_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)").unwrap());

#[derive(Debug, Clone)]
pub struct ScrollPolicy {
    pub pause: Duration,
    pub step_px: u64,
    pub step_delay: Duration,
    pub max_rounds: u32,
    pub budget: Option<Duration>,
}

impl From<&HarvestConfig> for ScrollPolicy {
    fn from(config: &HarvestConfig) -> Self {
        Self {
            pause: config.scroll_pause,
            step_px: config.scroll_step_px.max(1),
            step_delay: config.scroll_step_delay,
            max_rounds: config.max_scroll_rounds,
            budget: config.scroll_budget,
        }
    }
}

/// Result of lazy-load discovery.
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    /// Unique item URLs in first-seen order.
    pub urls: Vec<String>,
    pub expected: Option<usize>,
    /// Scroll rounds performed.
    pub rounds: u32,
    /// Accumulated unique count after each round.
    pub round_counts: Vec<usize>,
}

impl Discovery {
    /// False when a known expected count was not reached.
    pub fn is_complete(&self) -> bool {
        match self.expected {
            Some(expected) => self.urls.len() >= expected,
            None => true,
        }
    }
}

/// First integer in a heading such as "45 items".
pub fn parse_item_count(text: &str) -> Option<usize> {
    FIRST_NUMBER
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Read the total item count from the profile heading, if present and parseable.
pub fn read_expected_count(
    session: &dyn BrowserSession,
    heading_selector: &str,
    timeout: Duration,
) -> Result<Option<usize>, SessionError> {
    let found = recover(
        session.find_one(heading_selector, WaitKind::Presence, timeout),
        "Closet count heading",
    )?;
    let Some(heading) = found.flatten() else {
        warn!("❌ Failed to get number of closet items");
        return Ok(None);
    };
    let count = parse_item_count(heading.text().trim());
    match count {
        Some(n) => info!("👔 Total number of items in closet: {}", n),
        None => warn!("⚠️ Closet heading has no item count: {:?}", heading.text()),
    }
    Ok(count)
}

/// Scroll the current page until `expected` unique item links are found or the
/// round cap is hit. `expected` of `None` or `Some(0)` disables the early exit.
pub async fn discover_item_links(
    session: &dyn BrowserSession,
    link_selector: &str,
    expected: Option<usize>,
    policy: &ScrollPolicy,
) -> Result<Discovery, SessionError> {
    let target = expected.filter(|n| *n > 0);
    let started = Instant::now();
    let base_url = recover(session.current_url(), "Reading the listing URL")?
        .and_then(|base| Url::parse(&base).ok());

    let mut seen: HashSet<String> = HashSet::new();
    let mut discovery = Discovery {
        expected,
        ..Default::default()
    };

    while discovery.rounds < policy.max_rounds {
        scroll_full_page(session, policy).await?;
        sleep(policy.pause).await;

        let links = recover(session.find_all(link_selector), "Collecting item links")?;
        for link in links.unwrap_or_default() {
            let Some(href) = link.attribute("href") else {
                continue;
            };
            let resolved = resolve(base_url.as_ref(), href);
            if seen.insert(resolved.clone()) {
                discovery.urls.push(resolved);
            }
        }

        discovery.rounds += 1;
        discovery.round_counts.push(discovery.urls.len());
        debug!(
            "Scroll {}: found {} unique item URLs",
            discovery.rounds,
            discovery.urls.len()
        );

        if let Some(n) = target {
            if discovery.urls.len() >= n {
                info!("✅ Loaded all expected items.");
                break;
            }
        }

        if let Some(budget) = policy.budget {
            if started.elapsed() >= budget {
                warn!(
                    "⏳ Scroll budget of {:?} spent after {} rounds",
                    budget, discovery.rounds
                );
                break;
            }
        }
    }

    if !discovery.is_complete() {
        warn!(
            "⚠️ Found {} of {} expected items after {} scroll rounds",
            discovery.urls.len(),
            discovery.expected.unwrap_or_default(),
            discovery.rounds
        );
    }

    Ok(discovery)
}

async fn scroll_full_page(
    session: &dyn BrowserSession,
    policy: &ScrollPolicy,
) -> Result<(), SessionError> {
    let height = recover(
        session.execute_script("document.body.scrollHeight"),
        "Reading page height",
    )?
    .flatten()
    .and_then(|v| v.as_f64())
    .unwrap_or(0.0) as u64;

    let mut y = 0;
    while y < height {
        recover(
            session.execute_script(&format!("window.scrollTo(0, {});", y)),
            "Scroll step",
        )?;
        sleep(policy.step_delay).await;
        y += policy.step_px;
    }
    Ok(())
}

fn resolve(base: Option<&Url>, href: &str) -> String {
    base.and_then(|b| b.join(href).ok())
        .map(|u| u.to_string())
        .unwrap_or_else(|| href.to_string())
}
