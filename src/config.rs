//! Harvest configuration.
//!
//! Defaults mirror the timings that work against the live marketplace. Every
//! knob can be overridden from the environment (a `.env` file is honoured by the
//! binaries), and the CLI overrides the environment for the common ones.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Root folder for profile / item output.
    pub output_dir: PathBuf,
    /// Append-only file of failed download URLs.
    pub ledger_path: PathBuf,
    /// Upper bound on a single page load.
    pub nav_timeout: Duration,
    /// Wait after navigating to a profile page or the pre-flight target.
    pub nav_settle: Duration,
    /// Wait after navigating to an item page.
    pub page_settle: Duration,
    /// Bounded wait for title, description, condition and color probes.
    pub field_wait: Duration,
    /// Bounded wait for price and size probes.
    pub quick_field_wait: Duration,
    /// Settle time after each full-page scroll.
    pub scroll_pause: Duration,
    /// Pixels per incremental scroll step.
    pub scroll_step_px: u64,
    /// Delay between incremental scroll steps.
    pub scroll_step_delay: Duration,
    pub max_scroll_rounds: u32,
    /// Optional wall-clock bound on lazy-load discovery.
    pub scroll_budget: Option<Duration>,
    /// Extra scroll-and-wait cycles when no image selector matched.
    pub image_retry_rounds: u32,
    pub image_retry_pause: Duration,
    pub fetch_timeout: Duration,
    pub download_concurrency: usize,
    /// Cap on the number of items iterated for one profile.
    pub max_items: Option<usize>,
    pub preflight: bool,
    pub headless: bool,
    pub user_agent: String,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            ledger_path: PathBuf::from("failed_images.txt"),
            nav_timeout: Duration::from_secs(30),
            nav_settle: Duration::from_secs(2),
            page_settle: Duration::from_secs(3),
            field_wait: Duration::from_secs(10),
            quick_field_wait: Duration::from_secs(5),
            scroll_pause: Duration::from_secs(2),
            scroll_step_px: 300,
            scroll_step_delay: Duration::from_millis(200),
            max_scroll_rounds: 30,
            scroll_budget: None,
            image_retry_rounds: 3,
            image_retry_pause: Duration::from_secs(1),
            fetch_timeout: Duration::from_secs(15),
            download_concurrency: 4,
            max_items: None,
            preflight: true,
            headless: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl HarvestConfig {
    /// Build a config from `HARVEST_*` environment variables on top of the defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("HARVEST_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(dir);
        }
        if let Ok(path) = std::env::var("HARVEST_LEDGER_PATH") {
            config.ledger_path = PathBuf::from(path);
        }
        if let Some(secs) = env_parse::<u64>("HARVEST_NAV_TIMEOUT_SECS") {
            config.nav_timeout = Duration::from_secs(secs.max(1));
        }
        if let Some(ms) = env_parse::<u64>("HARVEST_NAV_SETTLE_MS") {
            config.nav_settle = Duration::from_millis(ms);
        }
        if let Some(ms) = env_parse::<u64>("HARVEST_PAGE_SETTLE_MS") {
            config.page_settle = Duration::from_millis(ms);
        }
        if let Some(secs) = env_parse::<u64>("HARVEST_FIELD_WAIT_SECS") {
            config.field_wait = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse::<u64>("HARVEST_QUICK_FIELD_WAIT_SECS") {
            config.quick_field_wait = Duration::from_secs(secs);
        }
        if let Some(ms) = env_parse::<u64>("HARVEST_SCROLL_PAUSE_MS") {
            config.scroll_pause = Duration::from_millis(ms);
        }
        if let Some(px) = env_parse::<u64>("HARVEST_SCROLL_STEP_PX") {
            config.scroll_step_px = px.max(1);
        }
        if let Some(ms) = env_parse::<u64>("HARVEST_SCROLL_STEP_DELAY_MS") {
            config.scroll_step_delay = Duration::from_millis(ms);
        }
        if let Some(rounds) = env_parse::<u32>("HARVEST_MAX_SCROLL_ROUNDS") {
            config.max_scroll_rounds = rounds;
        }
        if let Some(secs) = env_parse::<u64>("HARVEST_SCROLL_BUDGET_SECS") {
            config.scroll_budget = Some(Duration::from_secs(secs));
        }
        if let Some(rounds) = env_parse::<u32>("HARVEST_IMAGE_RETRY_ROUNDS") {
            config.image_retry_rounds = rounds;
        }
        if let Some(secs) = env_parse::<u64>("HARVEST_FETCH_TIMEOUT_SECS") {
            config.fetch_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = env_parse::<usize>("HARVEST_DOWNLOAD_CONCURRENCY") {
            config.download_concurrency = n.max(1);
        }
        if let Some(n) = env_parse::<usize>("HARVEST_MAX_ITEMS") {
            config.max_items = Some(n);
        }
        if let Some(flag) = env_parse::<bool>("HARVEST_PREFLIGHT") {
            config.preflight = flag;
        }
        if let Some(flag) = env_parse::<bool>("HARVEST_HEADLESS") {
            config.headless = flag;
        }
        if let Ok(ua) = std::env::var("HARVEST_USER_AGENT") {
            if !ua.trim().is_empty() {
                config.user_agent = ua;
            }
        }

        config
    }

    /// Zero-delay configuration for driving the pipeline against test doubles.
    pub fn immediate() -> Self {
        Self {
            nav_settle: Duration::ZERO,
            page_settle: Duration::ZERO,
            field_wait: Duration::ZERO,
            quick_field_wait: Duration::ZERO,
            scroll_pause: Duration::ZERO,
            scroll_step_delay: Duration::ZERO,
            image_retry_pause: Duration::ZERO,
            ..Self::default()
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("⚠️ Ignoring unparsable {}={:?}, keeping default", key, raw);
            None
        }
    }
}
