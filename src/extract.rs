//! Item page field extraction.
//!
//! Every field is an independent chain of bounded-wait probes; a miss only
//! leaves that field empty. The record is persisted as `description.txt` when at
//! least one field was found, and an existing artifact short-circuits probing.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::browser::{BrowserSession, WaitKind};
use crate::catalog::{parse_description, DESCRIPTION_FILE};
use crate::classifier::folder_name;
use crate::config::HarvestConfig;
use crate::error::{HarvestError, SessionError};
use crate::selectors::SiteSelectors;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Description,
    Price,
    Size,
    Condition,
    Color,
}

impl Field {
    /// Artifact order.
    pub const ALL: [Field; 5] = [
        Field::Description,
        Field::Price,
        Field::Size,
        Field::Condition,
        Field::Color,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Field::Description => "Description",
            Field::Price => "Price",
            Field::Size => "Size",
            Field::Condition => "Condition",
            Field::Color => "Color",
        }
    }
}

/// The optional text fields of an item.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ItemFields {
    pub description: Option<String>,
    pub price: Option<String>,
    pub size: Option<String>,
    pub condition: Option<String>,
    pub color: Option<String>,
}

impl ItemFields {
    fn slot(&mut self, field: Field) -> &mut Option<String> {
        match field {
            Field::Description => &mut self.description,
            Field::Price => &mut self.price,
            Field::Size => &mut self.size,
            Field::Condition => &mut self.condition,
            Field::Color => &mut self.color,
        }
    }

    pub fn get(&self, field: Field) -> Option<&str> {
        let value = match field {
            Field::Description => &self.description,
            Field::Price => &self.price,
            Field::Size => &self.size,
            Field::Condition => &self.condition,
            Field::Color => &self.color,
        };
        value.as_deref()
    }

    pub fn set(&mut self, field: Field, value: String) {
        *self.slot(field) = Some(value);
    }

    /// True when no field was found.
    pub fn is_empty(&self) -> bool {
        Field::ALL.iter().all(|f| self.get(*f).is_none())
    }

    /// `Key: value` lines; absent fields get an empty value.
    pub fn to_artifact(&self) -> String {
        Field::ALL
            .iter()
            .map(|f| format!("{}: {}\n", f.label(), self.get(*f).unwrap_or_default()))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemRecord {
    pub url: String,
    pub display_name: String,
    #[serde(flatten)]
    pub fields: ItemFields,
    pub image_urls: Vec<String>,
    pub images_saved: usize,
    pub folder: PathBuf,
    /// The artifact existed before this visit; fields were re-read, not probed.
    pub already_harvested: bool,
    pub missing: Vec<Field>,
}

/// One bounded-wait attempt at a field.
#[derive(Debug, Clone)]
pub struct FieldProbe {
    pub selector: String,
    pub wait: WaitKind,
    pub timeout: Duration,
}

impl FieldProbe {
    fn chain(selectors: &[String], timeout: Duration) -> Vec<FieldProbe> {
        selectors
            .iter()
            .map(|selector| FieldProbe {
                selector: selector.clone(),
                wait: WaitKind::Presence,
                timeout,
            })
            .collect()
    }
}

/// Probe chain per field. Price and size render with the price box and get the
/// shorter wait.
pub fn field_probes(field: Field, selectors: &SiteSelectors, config: &HarvestConfig) -> Vec<FieldProbe> {
    match field {
        Field::Description => FieldProbe::chain(&selectors.description, config.field_wait),
        Field::Price => FieldProbe::chain(&selectors.price, config.quick_field_wait),
        Field::Size => FieldProbe::chain(&selectors.size, config.quick_field_wait),
        Field::Condition => FieldProbe::chain(&selectors.condition, config.field_wait),
        Field::Color => FieldProbe::chain(&selectors.color, config.field_wait),
    }
}

/// First non-empty text produced by the chain. Only a fatal session error escapes.
pub fn run_probes(
    session: &dyn BrowserSession,
    probes: &[FieldProbe],
) -> Result<Option<String>, SessionError> {
    for probe in probes {
        match session.find_one(&probe.selector, probe.wait, probe.timeout) {
            Ok(Some(el)) => {
                let text = el.text().trim();
                if !text.is_empty() {
                    return Ok(Some(text.to_string()));
                }
            }
            Ok(None) => {}
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => debug!("Probe {} failed: {}", probe.selector, e),
        }
    }
    Ok(None)
}

/// Title from the page heading, else humanized from the URL, else a timestamp.
pub fn read_display_name(
    session: &dyn BrowserSession,
    selectors: &SiteSelectors,
    config: &HarvestConfig,
) -> Result<String, SessionError> {
    let heading = FieldProbe {
        selector: selectors.item_title.clone(),
        wait: WaitKind::Visibility,
        timeout: config.field_wait,
    };
    if let Some(title) = run_probes(session, &[heading])? {
        info!("✅ Extracted title: {}", title);
        return Ok(title);
    }

    warn!("❌ Could not extract title from HTML, falling back to URL method");
    let url = session.current_url()?;
    Ok(name_from_url(&url).unwrap_or_else(timestamp_name))
}

/// `/items/123-red-dress` becomes `123_Red Dress`.
pub fn name_from_url(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let path = parsed.path().trim_end_matches('/');
    let parts: Vec<&str> = path.split('/').collect();
    if parts.len() < 3 || parts[parts.len() - 2] != "items" {
        return None;
    }
    let slug = parts[parts.len() - 1];
    if slug.is_empty() {
        return None;
    }

    let (id, rest) = slug.split_once('-').unwrap_or((slug, ""));
    let clean = if rest.is_empty() {
        id.to_string()
    } else {
        format!("{}_{}", id, rest)
    };
    Some(title_case(&clean.replace('-', " ")))
}

/// Capitalize the first letter of every alphabetic run, lowercase the rest.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
        } else {
            out.push(c);
        }
        prev_alpha = c.is_alphabetic();
    }
    out
}

fn timestamp_name() -> String {
    format!("item_{}", chrono::Utc::now().timestamp())
}

/// Extract the item on the current page into a folder under `base`.
pub async fn extract_item(
    session: &dyn BrowserSession,
    item_url: &str,
    base: &Path,
    selectors: &SiteSelectors,
    config: &HarvestConfig,
) -> Result<ItemRecord, HarvestError> {
    let display_name = read_display_name(session, selectors, config)?;
    let folder = base.join(folder_name(&display_name).unwrap_or_else(timestamp_name));
    tokio::fs::create_dir_all(&folder).await?;

    let mut record = ItemRecord {
        url: item_url.to_string(),
        display_name,
        fields: ItemFields::default(),
        image_urls: Vec::new(),
        images_saved: 0,
        folder,
        already_harvested: false,
        missing: Vec::new(),
    };

    let artifact = record.folder.join(DESCRIPTION_FILE);
    if tokio::fs::try_exists(&artifact).await? {
        info!("✅ {} already exists, skipping save.", DESCRIPTION_FILE);
        let text = tokio::fs::read_to_string(&artifact).await?;
        record.fields = parse_description(&text);
        record.already_harvested = true;
        return Ok(record);
    }

    for field in Field::ALL {
        match run_probes(session, &field_probes(field, selectors, config))? {
            Some(value) => {
                info!("✅ Found {}: {}", field.label().to_lowercase(), preview(&value));
                record.fields.set(field, value);
            }
            None => {
                warn!("❌ Could not extract {}", field.label().to_lowercase());
                record.missing.push(field);
            }
        }
    }

    if record.fields.is_empty() {
        warn!("⚠️ Skipping {}: no item info was found", DESCRIPTION_FILE);
    } else {
        tokio::fs::write(&artifact, record.fields.to_artifact()).await?;
        info!("✅ Saved item infos to {}", DESCRIPTION_FILE);
    }

    Ok(record)
}

fn preview(value: &str) -> String {
    let mut chars = value.chars();
    let head: String = chars.by_ref().take(50).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeBrowser, FakePage};

    const ITEM: &str = "https://www.vinted.com/items/123-red-dress";
    const TITLE: &str =
        "<h1 class=\"web_ui__Text__text web_ui__Text__title web_ui__Text__left\">Red Dress</h1>";

    fn on_page(url: &str, body: &str) -> FakeBrowser {
        let browser = FakeBrowser::new().with_page(url, FakePage::new(body));
        browser.navigate(url).unwrap();
        browser
    }

    async fn extract(browser: &FakeBrowser, base: &Path) -> ItemRecord {
        extract_item(
            browser,
            ITEM,
            base,
            &SiteSelectors::default(),
            &HarvestConfig::immediate(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_missing_price_does_not_block_description() {
        let dir = tempfile::tempdir().unwrap();
        let body = format!(
            "{}<div itemprop=\"description\"><span><span>Lovely summer dress</span></span></div>\
             <div itemprop=\"size\"><span>M</span></div>",
            TITLE
        );
        let browser = on_page(ITEM, &body);

        let record = extract(&browser, dir.path()).await;
        assert_eq!(record.display_name, "Red Dress");
        assert_eq!(record.fields.description.as_deref(), Some("Lovely summer dress"));
        assert_eq!(record.fields.size.as_deref(), Some("M"));
        assert_eq!(record.fields.price, None);
        assert_eq!(
            record.missing,
            vec![Field::Price, Field::Condition, Field::Color]
        );

        let artifact = std::fs::read_to_string(dir.path().join("Red Dress").join(DESCRIPTION_FILE))
            .unwrap();
        assert_eq!(
            artifact,
            "Description: Lovely summer dress\nPrice: \nSize: M\nCondition: \nColor: \n"
        );
    }

    #[tokio::test]
    async fn test_fallback_selector_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let body = format!(
            "{}<div data-testid=\"item-price\"><span>£12.50</span></div>",
            TITLE
        );
        let browser = on_page(ITEM, &body);

        let record = extract(&browser, dir.path()).await;
        assert_eq!(record.fields.price.as_deref(), Some("£12.50"));
    }

    #[tokio::test]
    async fn test_empty_record_writes_no_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let browser = on_page(ITEM, TITLE);

        let record = extract(&browser, dir.path()).await;
        assert!(record.fields.is_empty());
        assert_eq!(record.missing.len(), 5);
        assert!(record.folder.is_dir());
        assert!(!record.folder.join(DESCRIPTION_FILE).exists());
    }

    #[tokio::test]
    async fn test_existing_artifact_skips_probing() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("Red Dress");
        std::fs::create_dir_all(&folder).unwrap();
        let stored = "Description: Stored text\nPrice: £9\nSize: \nCondition: New\nColor: Red\n";
        std::fs::write(folder.join(DESCRIPTION_FILE), stored).unwrap();

        let body = format!(
            "{}<div itemprop=\"description\"><span><span>Fresh text</span></span></div>",
            TITLE
        );
        let browser = on_page(ITEM, &body);

        let record = extract(&browser, dir.path()).await;
        assert!(record.already_harvested);
        assert_eq!(record.fields.description.as_deref(), Some("Stored text"));
        assert_eq!(record.fields.color.as_deref(), Some("Red"));
        assert_eq!(browser.probes(), vec![SiteSelectors::default().item_title]);
        assert_eq!(
            std::fs::read_to_string(folder.join(DESCRIPTION_FILE)).unwrap(),
            stored
        );
    }

    #[tokio::test]
    async fn test_dot_name_stays_inside_base() {
        let dir = tempfile::tempdir().unwrap();
        let browser = on_page(
            ITEM,
            "<h1 class=\"web_ui__Text__text web_ui__Text__title web_ui__Text__left\">..</h1>",
        );

        let record = extract(&browser, dir.path()).await;
        assert_eq!(record.display_name, "..");
        assert_eq!(record.folder.parent(), Some(dir.path()));
        let name = record.folder.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("item_"));
        assert!(record.folder.is_dir());
    }

    #[tokio::test]
    async fn test_name_falls_back_to_url() {
        let dir = tempfile::tempdir().unwrap();
        let url = "https://www.vinted.com/items/4567-blue-denim-jacket";
        let browser = on_page(url, "<div itemprop=\"color\"><span>Blue</span></div>");

        let record = extract(&browser, dir.path()).await;
        assert_eq!(record.display_name, "4567_Blue Denim Jacket");
        assert!(dir.path().join("4567_Blue Denim Jacket").is_dir());
    }

    #[test]
    fn test_name_from_url() {
        assert_eq!(
            name_from_url("https://www.vinted.fr/items/99-robe-d-ete/").as_deref(),
            Some("99_Robe D Ete")
        );
        assert_eq!(
            name_from_url("https://www.vinted.fr/items/99").as_deref(),
            Some("99")
        );
        assert_eq!(name_from_url("https://www.vinted.fr/member/1-bob"), None);
        assert_eq!(name_from_url("not a url"), None);
    }

    #[test]
    fn test_timestamp_name_shape() {
        let name = timestamp_name();
        assert!(name.starts_with("item_"));
        assert!(name["item_".len()..].chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_title_case_matches_word_boundaries() {
        assert_eq!(title_case("123_red dress"), "123_Red Dress");
        assert_eq!(title_case("RED 2pc set"), "Red 2Pc Set");
    }

    #[test]
    fn test_artifact_round_trips_through_catalog_parser() {
        let mut fields = ItemFields::default();
        fields.set(Field::Price, "£5".into());
        fields.set(Field::Color, "Green".into());
        assert_eq!(parse_description(&fields.to_artifact()), fields);
    }

    #[test]
    fn test_preview_truncates_long_text() {
        assert_eq!(preview("short"), "short");
        let long = "x".repeat(60);
        assert_eq!(preview(&long), format!("{}...", "x".repeat(50)));
    }
}
