//! Item media discovery and download.
//!
//! Candidate images are collected with the first selector strategy that yields
//! a marketplace media URL, deduplicated, then fetched through a bounded pool.
//! A failed download is recorded in the ledger and never stops the others.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::Url;
use serde::Serialize;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::browser::{BrowserSession, Element};
use crate::classifier::sanitize_filename;
use crate::config::HarvestConfig;
use crate::error::{recover, SessionError};
use crate::ledger::FailureSink;
use crate::selectors::SiteSelectors;

/// Response of a single media fetch.
#[derive(Debug, Clone)]
pub struct FetchedMedia {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl FetchedMedia {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Plain HTTP GET for media bytes.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, url: &str, timeout: Duration) -> anyhow::Result<FetchedMedia>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl MediaFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> anyhow::Result<FetchedMedia> {
        let resp = self.client.get(url).timeout(timeout).send().await?;
        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let body = resp.bytes().await?.to_vec();
        Ok(FetchedMedia {
            status,
            content_type,
            body,
        })
    }
}

/// Result of one image download.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadOutcome {
    pub url: String,
    /// 1-based position in the deduplicated URL list.
    pub ordinal: usize,
    pub success: bool,
    pub path: Option<PathBuf>,
    pub reason: Option<String>,
}

impl DownloadOutcome {
    fn saved(url: &str, ordinal: usize, path: PathBuf) -> Self {
        Self {
            url: url.to_string(),
            ordinal,
            success: true,
            path: Some(path),
            reason: None,
        }
    }

    fn failed(url: &str, ordinal: usize, reason: String) -> Self {
        Self {
            url: url.to_string(),
            ordinal,
            success: false,
            path: None,
            reason: Some(reason),
        }
    }
}

/// Collect the item's image URLs from the current page.
///
/// Strategies in `selectors.item_images` are tried narrowest first and the first
/// one producing an accepted URL wins. When none does, the page is scrolled a few
/// times and the broadest image selector is re-queried.
pub async fn collect_image_urls(
    session: &dyn BrowserSession,
    item_url: &str,
    selectors: &SiteSelectors,
    config: &HarvestConfig,
) -> Result<Vec<String>, SessionError> {
    let base = Url::parse(item_url).ok();

    for (idx, selector) in selectors.item_images.iter().enumerate() {
        let Some(elements) = recover(session.find_all(selector), "Image strategy")? else {
            continue;
        };
        let found = accepted_sources(&elements, base.as_ref(), |url| {
            url.contains(&selectors.media_host) && url.contains(&selectors.media_thumbnail_segment)
        });
        if !found.is_empty() {
            debug!("Image strategy {} matched {} candidates", idx + 1, found.len());
            return Ok(unique_in_order(found));
        }
    }

    for round in 1..=config.image_retry_rounds {
        debug!("No images yet, scroll retry {}/{}", round, config.image_retry_rounds);
        recover(session.execute_script("window.scrollBy(0, 500);"), "Image retry scroll")?;
        sleep(config.image_retry_pause).await;

        let Some(elements) = recover(session.find_all(&selectors.any_image), "Image retry")? else {
            continue;
        };
        let found = accepted_sources(&elements, base.as_ref(), |url| url.contains(&selectors.media_host));
        if !found.is_empty() {
            return Ok(unique_in_order(found));
        }
    }

    warn!("❌ No images found for {}", item_url);
    Ok(Vec::new())
}

fn accepted_sources(
    elements: &[Element],
    base: Option<&Url>,
    accept: impl Fn(&str) -> bool,
) -> Vec<String> {
    elements
        .iter()
        .filter_map(|el| el.attribute("src").or_else(|| el.attribute("data-src")))
        .filter(|src| !src.trim().is_empty())
        .map(|src| match base {
            Some(base) => base
                .join(src.trim())
                .map(|u| u.to_string())
                .unwrap_or_else(|_| src.to_string()),
            None => src.to_string(),
        })
        .filter(|url| accept(url))
        .collect()
}

fn unique_in_order(urls: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    urls.into_iter().filter(|u| seen.insert(u.clone())).collect()
}

/// Download every unique URL into `folder` as `{name}_{ordinal}{ext}`.
///
/// Outcomes are returned in ordinal order. Ordinals follow the position in the
/// deduplicated list, so a failed image leaves a gap rather than renumbering.
pub async fn download_all(
    fetcher: &dyn MediaFetcher,
    ledger: &dyn FailureSink,
    urls: &[String],
    folder: &Path,
    display_name: &str,
    config: &HarvestConfig,
) -> Vec<DownloadOutcome> {
    let urls = unique_in_order(urls.to_vec());
    let stem = file_stem(display_name);

    let mut outcomes: Vec<DownloadOutcome> = stream::iter(urls.iter().enumerate())
        .map(|(idx, url)| {
            download_one(fetcher, ledger, url, idx + 1, folder, &stem, config.fetch_timeout)
        })
        .buffer_unordered(config.download_concurrency.max(1))
        .collect()
        .await;
    outcomes.sort_by_key(|o| o.ordinal);

    let saved = outcomes.iter().filter(|o| o.success).count();
    info!("🖼️ Saved {}/{} images for {}", saved, outcomes.len(), display_name);
    outcomes
}

async fn download_one(
    fetcher: &dyn MediaFetcher,
    ledger: &dyn FailureSink,
    url: &str,
    ordinal: usize,
    folder: &Path,
    stem: &str,
    timeout: Duration,
) -> DownloadOutcome {
    let fail = |reason: String| {
        ledger.record(url, &reason);
        DownloadOutcome::failed(url, ordinal, reason)
    };

    let media = match fetcher.fetch(url, timeout).await {
        Ok(media) if media.is_success() => media,
        Ok(media) => return fail(format!("HTTP {}", media.status)),
        Err(e) => return fail(e.to_string()),
    };

    let ext = image_extension(media.content_type.as_deref(), url);
    let path = folder.join(format!("{}_{}{}", stem, ordinal, ext));
    match tokio::fs::write(&path, &media.body).await {
        Ok(()) => {
            debug!("Downloaded image {}", path.display());
            DownloadOutcome::saved(url, ordinal, path)
        }
        Err(e) => fail(format!("write {}: {}", path.display(), e)),
    }
}

fn file_stem(display_name: &str) -> String {
    let stem = sanitize_filename(display_name).replace(' ', "_");
    if stem.is_empty() {
        "item".to_string()
    } else {
        stem
    }
}

/// Extension from the declared content type, then the URL, then `.jpg`.
pub fn image_extension(content_type: Option<&str>, url: &str) -> &'static str {
    let ct = content_type.unwrap_or_default().to_lowercase();
    if ct.contains("jpeg") || ct.contains("jpg") {
        return ".jpg";
    }
    if ct.contains("png") {
        return ".png";
    }

    let path = Url::parse(url)
        .map(|u| u.path().to_lowercase())
        .unwrap_or_else(|_| url.to_lowercase());
    match path.rsplit_once('.').map(|(_, ext)| ext) {
        Some("jpg" | "jpeg") => ".jpg",
        Some("png") => ".png",
        Some("webp") => ".webp",
        Some("gif") => ".gif",
        _ => ".jpg",
    }
}

/// Extension for the profile picture, from the content type only.
pub fn avatar_extension(content_type: Option<&str>) -> &'static str {
    let ct = content_type.unwrap_or_default().to_lowercase();
    if ct.contains("png") {
        ".png"
    } else if ct.contains("webp") {
        ".webp"
    } else {
        ".jpg"
    }
}

/// Save the avatar as `profilepic{ext}`. Best effort: failures only log.
pub async fn download_avatar(
    fetcher: &dyn MediaFetcher,
    url: &str,
    folder: &Path,
    timeout: Duration,
) -> Option<PathBuf> {
    let media = match fetcher.fetch(url, timeout).await {
        Ok(media) if media.is_success() => media,
        Ok(media) => {
            warn!("⚠️ Failed to download profile picture: HTTP {}", media.status);
            return None;
        }
        Err(e) => {
            warn!("⚠️ Failed to download profile picture: {}", e);
            return None;
        }
    };

    let path = folder.join(format!(
        "profilepic{}",
        avatar_extension(media.content_type.as_deref())
    ));
    match tokio::fs::write(&path, &media.body).await {
        Ok(()) => {
            info!("✅ Profile picture saved to {}", path.display());
            Some(path)
        }
        Err(e) => {
            warn!("⚠️ Could not write profile picture {}: {}", path.display(), e);
            None
        }
    }
}
