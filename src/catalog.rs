//! Reading harvested output back.
//!
//! An output root holds one folder per item with an optional `description.txt`
//! and numbered images. `load_products` turns that layout into product entries
//! for listing UIs; `parse_description` re-reads a single artifact.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::extract::{Field, ItemFields};

pub const DESCRIPTION_FILE: &str = "description.txt";

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

static PRICE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d[\d,]*(?:\.\d+)?").unwrap());

/// One harvested item as a listing entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Product {
    pub id: String,
    pub title: String,
    /// Paths relative to the output root.
    pub images: Vec<String>,
    /// Raw artifact text.
    pub description: String,
    pub price: f64,
    pub size: String,
    pub brand: String,
    pub condition: String,
    pub category: String,
    #[serde(rename = "isSelected")]
    pub is_selected: bool,
}

impl Product {
    fn empty(id: &str) -> Self {
        Self {
            id: id.to_string(),
            title: id.to_string(),
            images: Vec::new(),
            description: String::new(),
            price: 0.0,
            size: String::new(),
            brand: String::new(),
            condition: String::new(),
            category: String::new(),
            is_selected: true,
        }
    }
}

/// Split an artifact into `(lowercased key, value)` pairs. Lines without a
/// recognised `Key:` prefix continue the previous value (multi-line descriptions).
fn key_values(text: &str) -> Vec<(String, String)> {
    const KEYS: &[&str] = &[
        "description",
        "price",
        "size",
        "condition",
        "color",
        "brand",
        "category",
    ];

    let mut pairs: Vec<(String, String)> = Vec::new();
    for line in text.lines() {
        let keyed = line.split_once(':').and_then(|(key, value)| {
            let key = key.trim().to_lowercase();
            KEYS.contains(&key.as_str()).then(|| (key, value.trim().to_string()))
        });
        if let Some(pair) = keyed {
            pairs.push(pair);
        } else if let Some((_, value)) = pairs.last_mut() {
            value.push('\n');
            value.push_str(line);
        }
    }
    for (_, value) in pairs.iter_mut() {
        *value = value.trim().to_string();
    }
    pairs
}

/// Parse a `description.txt` artifact back into item fields.
pub fn parse_description(text: &str) -> ItemFields {
    let mut fields = ItemFields::default();
    for (key, value) in key_values(text) {
        let field = match key.as_str() {
            "description" => Field::Description,
            "price" => Field::Price,
            "size" => Field::Size,
            "condition" => Field::Condition,
            "color" => Field::Color,
            _ => continue,
        };
        if !value.is_empty() {
            fields.set(field, value);
        }
    }
    fields
}

/// First number on a price line as a float; `0.0` when there is none.
///
/// A single comma followed by exactly two digits is a decimal comma ("12,50 €"),
/// any other comma is a thousands separator.
pub fn parse_price(text: &str) -> f64 {
    let Some(m) = PRICE_NUMBER.find(text) else {
        return 0.0;
    };
    let raw = m.as_str();
    let normalized = match raw.split_once(',') {
        Some((whole, cents))
            if !raw.contains('.') && cents.len() == 2 && cents.chars().all(|c| c.is_ascii_digit()) =>
        {
            format!("{}.{}", whole, cents)
        }
        _ => raw.replace(',', ""),
    };
    normalized.parse().unwrap_or(0.0)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// List every item folder under `dir` as a product, sorted by folder name.
pub fn load_products(dir: &Path) -> Result<Vec<Product>> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("Cannot read output folder {}", dir.display()))?;

    let mut products = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let id = entry.file_name().to_string_lossy().to_string();
        let mut product = Product::empty(&id);

        let desc_path = entry.path().join(DESCRIPTION_FILE);
        if desc_path.is_file() {
            let text = fs::read_to_string(&desc_path)
                .with_context(|| format!("Cannot read {}", desc_path.display()))?;
            for (key, value) in key_values(&text) {
                match key.as_str() {
                    "price" => product.price = parse_price(&value),
                    "size" => product.size = value,
                    "brand" => product.brand = value,
                    "condition" => product.condition = value,
                    "category" => product.category = value,
                    _ => {}
                }
            }
            product.description = text;
        }

        let mut images: Vec<String> = fs::read_dir(entry.path())?
            .filter_map(|f| f.ok())
            .map(|f| f.path())
            .filter(|p| p.is_file() && is_image(p))
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
            .map(|name| format!("{}/{}", id, name))
            .collect();
        images.sort();
        product.images = images;

        products.push(product);
    }

    products.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(products)
}
