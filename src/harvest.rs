//! Harvest orchestration.
//!
//! One [`Harvester`] drives one invocation: classify the target, optionally
//! pre-flight it, then either extract a single item or discover a profile's
//! items and process them one by one. Per-item errors are tallied and skipped;
//! input errors and fatal session errors end the harvest. The browser session is
//! closed on every exit path.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::browser::{BrowserSession, WaitKind};
use crate::classifier::{classify, folder_name, TargetKind, TargetUrl};
use crate::config::HarvestConfig;
use crate::error::{recover, HarvestError};
use crate::extract::{extract_item, run_probes, Field, FieldProbe, ItemRecord};
use crate::lazy_load::{discover_item_links, read_expected_count, ScrollPolicy};
use crate::ledger::{FailureSink, LedgerEntry, MemoryLedger};
use crate::media::{collect_image_urls, download_all, download_avatar, MediaFetcher};
use crate::selectors::SiteSelectors;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HarvestRequest {
    Item(String),
    Profile(String),
}

impl HarvestRequest {
    fn raw(&self) -> &str {
        match self {
            HarvestRequest::Item(url) | HarvestRequest::Profile(url) => url,
        }
    }

    fn expected_kind(&self) -> TargetKind {
        match self {
            HarvestRequest::Item(_) => TargetKind::SingleItem,
            HarvestRequest::Profile(_) => TargetKind::Profile,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HarvestState {
    Idle,
    Classifying,
    Preflight,
    Extracting,
    DiscoveringProfile,
    DiscoveringItems,
    IteratingItems,
    Done,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileHandle {
    pub username: String,
    pub avatar_url: Option<String>,
    pub folder: PathBuf,
    pub avatar_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldMiss {
    pub url: String,
    pub field: Field,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemFailure {
    pub url: String,
    pub reason: String,
}

/// Best-effort outcome of a harvest, with a tally of everything skipped.
#[derive(Debug, Clone, Serialize)]
pub struct HarvestReport {
    pub success: bool,
    pub kind: TargetKind,
    pub target: String,
    pub url_username: String,
    pub profile: Option<ProfileHandle>,
    pub items: Vec<ItemRecord>,
    pub count: usize,
    pub expected_count: Option<usize>,
    pub discovered: usize,
    pub field_misses: Vec<FieldMiss>,
    pub image_failures: Vec<LedgerEntry>,
    pub item_failures: Vec<ItemFailure>,
    pub cancelled: bool,
    pub truncated: bool,
}

impl HarvestReport {
    fn new(target: &TargetUrl) -> Self {
        Self {
            success: false,
            kind: target.kind,
            target: target.normalized.clone(),
            url_username: target.username(),
            profile: None,
            items: Vec::new(),
            count: 0,
            expected_count: None,
            discovered: 0,
            field_misses: Vec::new(),
            image_failures: Vec::new(),
            item_failures: Vec::new(),
            cancelled: false,
            truncated: false,
        }
    }

    fn push_item(&mut self, record: ItemRecord) {
        self.field_misses
            .extend(record.missing.iter().map(|field| FieldMiss {
                url: record.url.clone(),
                field: *field,
            }));
        self.items.push(record);
    }
}

/// Forwards to the shared ledger and keeps this harvest's entries for the report.
struct TallyLedger<'a> {
    shared: &'a dyn FailureSink,
    local: MemoryLedger,
}

impl FailureSink for TallyLedger<'_> {
    fn record(&self, url: &str, reason: &str) {
        self.shared.record(url, reason);
        self.local.record(url, reason);
    }
}

pub struct Harvester<'a> {
    session: &'a dyn BrowserSession,
    fetcher: &'a dyn MediaFetcher,
    ledger: &'a dyn FailureSink,
    config: HarvestConfig,
    selectors: SiteSelectors,
    cancel: CancellationToken,
}

impl<'a> Harvester<'a> {
    pub fn new(
        session: &'a dyn BrowserSession,
        fetcher: &'a dyn MediaFetcher,
        ledger: &'a dyn FailureSink,
        config: HarvestConfig,
    ) -> Self {
        Self {
            session,
            fetcher,
            ledger,
            config,
            selectors: SiteSelectors::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_selectors(mut self, selectors: SiteSelectors) -> Self {
        self.selectors = selectors;
        self
    }

    /// Stop at the next item boundary once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Run the harvest and close the session, whatever the outcome.
    pub async fn run(self, request: HarvestRequest) -> Result<HarvestReport, HarvestError> {
        let result = self.execute(&request).await;
        if let Err(e) = self.session.close() {
            warn!("⚠️ Failed to close browser session: {}", e);
        }
        if let Err(e) = &result {
            error!("❌ Harvest of {} failed: {}", request.raw(), e);
        }
        result
    }

    async fn execute(&self, request: &HarvestRequest) -> Result<HarvestReport, HarvestError> {
        let mut state = HarvestState::Idle;

        transition(&mut state, HarvestState::Classifying);
        let target = classify(request.raw())?;
        if target.kind != request.expected_kind() {
            return Err(HarvestError::KindMismatch {
                url: target.normalized,
                expected: request.expected_kind().as_str(),
                actual: target.kind.as_str(),
            });
        }

        if self.config.preflight {
            transition(&mut state, HarvestState::Preflight);
            self.preflight(&target.normalized).await?;
        }

        let ledger = TallyLedger {
            shared: self.ledger,
            local: MemoryLedger::new(),
        };
        let mut report = HarvestReport::new(&target);

        match target.kind {
            TargetKind::SingleItem => {
                transition(&mut state, HarvestState::Extracting);
                let base = self.config.output_dir.clone();
                self.process_item(&target.normalized, &base, &ledger, &mut report)
                    .await?;
            }
            TargetKind::Profile => {
                transition(&mut state, HarvestState::DiscoveringProfile);
                let profile = self.discover_profile(&target.normalized).await?;

                transition(&mut state, HarvestState::DiscoveringItems);
                let expected = read_expected_count(
                    self.session,
                    &self.selectors.closet_count_heading,
                    self.config.field_wait,
                )?;
                let discovery = discover_item_links(
                    self.session,
                    &self.selectors.item_link,
                    expected,
                    &ScrollPolicy::from(&self.config),
                )
                .await?;
                report.expected_count = expected;
                report.discovered = discovery.urls.len();

                transition(&mut state, HarvestState::IteratingItems);
                let total = discovery.urls.len();
                info!("♻️ Starting download of {} items...", total);
                for (idx, url) in discovery.urls.iter().enumerate() {
                    if self.cancel.is_cancelled() {
                        warn!("🛑 Harvest cancelled after {} of {} items", idx, total);
                        report.cancelled = true;
                        break;
                    }
                    if self.config.max_items.is_some_and(|max| idx >= max) {
                        warn!("⚠️ Item cap reached, skipping the remaining {} items", total - idx);
                        report.truncated = true;
                        break;
                    }
                    info!("♻️ Downloading {} of {} articles", idx + 1, total);
                    self.process_item(url, &profile.folder, &ledger, &mut report)
                        .await?;
                }
                report.profile = Some(profile);
            }
        }

        report.image_failures = ledger.local.entries();
        report.count = report.items.len();
        report.success = !report.items.is_empty() || report.item_failures.is_empty();
        transition(&mut state, HarvestState::Done);
        info!(
            "🎉 Harvest finished: {} items, {} item failures, {} image failures",
            report.count,
            report.item_failures.len(),
            report.image_failures.len()
        );
        Ok(report)
    }

    /// Load the target once and look for not-found markers.
    async fn preflight(&self, url: &str) -> Result<(), HarvestError> {
        if let Err(e) = self.session.navigate(url) {
            if e.is_fatal() {
                return Err(e.into());
            }
            warn!("❌ Error checking URL: {}", e);
            return Err(HarvestError::NotFound(url.to_string()));
        }
        sleep(self.config.nav_settle).await;

        let title = recover(
            self.session.execute_script("document.title"),
            "Pre-flight title check",
        )?
        .flatten()
        .and_then(|v| v.as_str().map(str::to_lowercase))
        .unwrap_or_default();
        if title.contains("404") || title.contains("not found") {
            return Err(HarvestError::NotFound(url.to_string()));
        }

        let banner = recover(
            self.session.find_all(&self.selectors.error_banner),
            "Pre-flight banner check",
        )?
        .unwrap_or_default();
        if banner
            .first()
            .is_some_and(|el| el.text().to_lowercase().contains("not exist"))
        {
            return Err(HarvestError::NotFound(url.to_string()));
        }
        Ok(())
    }

    async fn discover_profile(&self, url: &str) -> Result<ProfileHandle, HarvestError> {
        if let Err(e) = self.session.navigate(url) {
            if e.is_fatal() {
                return Err(e.into());
            }
            warn!("❌ Error loading profile: {}", e);
            return Err(HarvestError::NotFound(url.to_string()));
        }
        sleep(self.config.nav_settle).await;

        let probe = FieldProbe {
            selector: self.selectors.profile_username.clone(),
            wait: WaitKind::Presence,
            timeout: self.config.field_wait,
        };
        let username = run_probes(self.session, &[probe])?
            .and_then(|name| folder_name(&name))
            .ok_or_else(|| HarvestError::ProfileUnavailable(url.to_string()))?;
        info!("💤 Fetching all item URLs from user: {}", username);

        let avatar_url = recover(
            self.session.find_all(&self.selectors.profile_avatar),
            "Profile picture lookup",
        )?
        .unwrap_or_default()
        .first()
        .and_then(|el| el.attribute("src"))
        .map(String::from);

        let folder = self.config.output_dir.join(&username);
        tokio::fs::create_dir_all(&folder).await?;

        let avatar_path = match &avatar_url {
            Some(src) => download_avatar(self.fetcher, src, &folder, self.config.fetch_timeout).await,
            None => {
                warn!("⚠️ No profile picture found for {}", username);
                None
            }
        };

        Ok(ProfileHandle {
            username,
            avatar_url,
            folder,
            avatar_path,
        })
    }

    /// Process one item and file the outcome in the report. Only fatal session
    /// errors are returned.
    async fn process_item(
        &self,
        url: &str,
        base: &Path,
        ledger: &TallyLedger<'_>,
        report: &mut HarvestReport,
    ) -> Result<(), HarvestError> {
        match self.harvest_item(url, base, ledger).await {
            Ok(record) => {
                info!("👔 {}, informations and images downloaded", record.display_name);
                report.push_item(record);
                Ok(())
            }
            Err(HarvestError::Session(e)) if e.is_fatal() => Err(HarvestError::Session(e)),
            Err(e) => {
                error!("❌ Failed to harvest {}: {}", url, e);
                report.item_failures.push(ItemFailure {
                    url: url.to_string(),
                    reason: e.to_string(),
                });
                Ok(())
            }
        }
    }

    async fn harvest_item(
        &self,
        url: &str,
        base: &Path,
        ledger: &dyn FailureSink,
    ) -> Result<ItemRecord, HarvestError> {
        info!("♻️ Starting download for: {}", url);
        recover(self.session.reset_page(), "Clearing the previous page")?;
        self.session.navigate(url)?;
        sleep(self.config.page_settle).await;

        let mut record = extract_item(self.session, url, base, &self.selectors, &self.config).await?;

        let image_urls = collect_image_urls(self.session, url, &self.selectors, &self.config).await?;
        let outcomes = download_all(
            self.fetcher,
            ledger,
            &image_urls,
            &record.folder,
            &record.display_name,
            &self.config,
        )
        .await;
        record.images_saved = outcomes.iter().filter(|o| o.success).count();
        record.image_urls = image_urls;
        Ok(record)
    }
}

fn transition(state: &mut HarvestState, next: HarvestState) {
    debug!("Harvest state: {:?} -> {:?}", state, next);
    *state = next;
}
