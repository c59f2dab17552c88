//! Marketplace URL classification.
//!
//! Turns user input into a [`TargetUrl`] or rejects it. The kind is derived
//! from the path prefix only; page content is never consulted.

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use serde::Serialize;

use crate::error::HarvestError;

/// Placeholder identity when no username can be read from the URL.
pub const UNKNOWN_USER: &str = "unknown_user";

const ITEM_PREFIX: &str = "/items/";
const PROFILE_PREFIXES: &[&str] = &["/member/", "/catalog/", "/user/"];

// Any subdomain, the marketplace label, then a TLD with an optional co/com level (.fr, .com, .co.uk)
static MARKETPLACE_HOST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[a-z0-9-]+\.)*vinted(?:\.com?)?\.[a-z]{2,3}$").unwrap());

static USERNAME_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"^/member/\d+-([^/?]+)").unwrap(),
        Regex::new(r"^/user/([^/?]+)").unwrap(),
    ]
});

static UNSAFE_FILENAME_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[<>:"/\\|?*]"#).unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    SingleItem,
    Profile,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::SingleItem => "item",
            TargetKind::Profile => "profile",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetUrl {
    pub raw: String,
    pub kind: TargetKind,
    pub normalized: String,
}

impl TargetUrl {
    /// Username for folder naming and reporting, or [`UNKNOWN_USER`].
    pub fn username(&self) -> String {
        extract_username(&self.normalized).unwrap_or_else(|| UNKNOWN_USER.to_string())
    }
}

/// Validate and canonicalize `raw`.
pub fn classify(raw: &str) -> Result<TargetUrl, HarvestError> {
    let reject = |reason: &str| HarvestError::InvalidUrl {
        input: raw.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(reject("empty input"));
    }

    let with_scheme = if has_scheme(trimmed) {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let url = Url::parse(&with_scheme).map_err(|e| reject(&e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(reject("scheme must be http or https"));
    }

    let host = url.host_str().unwrap_or_default().to_lowercase();
    if !MARKETPLACE_HOST.is_match(&host) {
        return Err(reject("host is not a marketplace domain"));
    }

    let path = url.path().to_lowercase();
    let kind = if path.starts_with(ITEM_PREFIX) {
        TargetKind::SingleItem
    } else if PROFILE_PREFIXES.iter().any(|p| path.starts_with(p)) {
        TargetKind::Profile
    } else {
        return Err(reject("path is not an item, member, catalog or user page"));
    };

    Ok(TargetUrl {
        raw: raw.to_string(),
        kind,
        normalized: url.to_string(),
    })
}

/// Username from a profile URL: `member/{id}-{name}` first, then `user/{name}`.
pub fn extract_username(url: &str) -> Option<String> {
    let path = Url::parse(url).ok()?.path().to_string();
    USERNAME_PATTERNS
        .iter()
        .find_map(|re| re.captures(&path))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|name| !name.is_empty())
}

/// Strip characters that are not allowed in folder or file names.
pub fn sanitize_filename(name: &str) -> String {
    UNSAFE_FILENAME_CHARS.replace_all(name, "").trim().to_string()
}

/// Sanitized name usable as a single folder component under the output root.
/// `None` when nothing is left or the result would name the current or parent
/// directory.
pub fn folder_name(name: &str) -> Option<String> {
    let clean = sanitize_filename(name);
    match clean.as_str() {
        "" | "." | ".." => None,
        _ => Some(clean),
    }
}

fn has_scheme(s: &str) -> bool {
    match s.find("://") {
        Some(idx) => s[..idx]
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepends_https_when_scheme_missing() {
        let target = classify("  www.vinted.co.uk/items/123-red-dress ").unwrap();
        assert_eq!(target.kind, TargetKind::SingleItem);
        assert_eq!(target.normalized, "https://www.vinted.co.uk/items/123-red-dress");
    }

    #[test]
    fn test_profile_paths() {
        for url in [
            "https://www.vinted.com/member/42-alice",
            "https://www.vinted.fr/user/bob",
            "http://vinted.de/catalog/2050-clothing",
        ] {
            let target = classify(url).unwrap();
            assert_eq!(target.kind, TargetKind::Profile, "{}", url);
            assert!(target.normalized.starts_with("http"));
        }
    }

    #[test]
    fn test_rejects_foreign_hosts_and_schemes() {
        assert!(classify("https://www.example.com/items/1").is_err());
        assert!(classify("https://notvinted.com/items/1").is_err());
        assert!(classify("https://vinted.com.evil.org/items/1").is_err());
        assert!(classify("ftp://www.vinted.com/items/1").is_err());
        assert!(classify("").is_err());
    }

    #[test]
    fn test_rejects_unknown_paths() {
        let err = classify("https://www.vinted.com/help/faq").unwrap_err();
        assert!(matches!(err, HarvestError::InvalidUrl { .. }));
        assert!(classify("https://www.vinted.com/").is_err());
    }

    #[test]
    fn test_path_prefix_is_case_insensitive() {
        assert_eq!(
            classify("https://www.vinted.com/Items/9-hat").unwrap().kind,
            TargetKind::SingleItem
        );
    }

    #[test]
    fn test_username_patterns_in_order() {
        assert_eq!(
            extract_username("https://www.vinted.co.uk/member/12345-jane_doe?tab=closet"),
            Some("jane_doe".to_string())
        );
        assert_eq!(
            extract_username("https://www.vinted.com/user/bob/items"),
            Some("bob".to_string())
        );
        assert_eq!(extract_username("https://www.vinted.com/member/12345"), None);
        assert_eq!(extract_username("https://www.vinted.com/catalog/1-shoes"), None);
    }

    #[test]
    fn test_username_placeholder() {
        let target = classify("https://www.vinted.com/catalog/1-shoes").unwrap();
        assert_eq!(target.username(), UNKNOWN_USER);
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename(" Nike <Air>: \"Max\" 90/95? "), "Nike Air Max 9095");
        assert_eq!(sanitize_filename("a|b*c\\d"), "abcd");
    }

    #[test]
    fn test_folder_name_rejects_dot_components() {
        assert_eq!(folder_name(" Red Dress "), Some("Red Dress".to_string()));
        assert_eq!(folder_name("..."), Some("...".to_string()));
        assert_eq!(folder_name(".."), None);
        assert_eq!(folder_name(" . "), None);
        assert_eq!(folder_name("/.."), None);
        assert_eq!(folder_name("<>"), None);
    }
}
