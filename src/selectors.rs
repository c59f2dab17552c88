//! CSS selectors for the marketplace's current markup.
//!
//! Everything the pipeline looks for on a page is listed here so that markup
//! drift is fixed in one place.

/// Selectors and URL markers for one marketplace front-end.
#[derive(Debug, Clone)]
pub struct SiteSelectors {
    pub item_title: String,
    pub description: Vec<String>,
    pub price: Vec<String>,
    pub size: Vec<String>,
    pub condition: Vec<String>,
    pub color: Vec<String>,
    pub profile_username: String,
    pub profile_avatar: String,
    /// Heading that states the total number of listed items.
    pub closet_count_heading: String,
    pub item_link: String,
    /// Image strategies, narrowest first.
    pub item_images: Vec<String>,
    /// Broadest image selector, used by the scroll-and-retry recovery.
    pub any_image: String,
    pub error_banner: String,
    /// Substring every accepted media URL must contain.
    pub media_host: String,
    /// Path segment of resized/thumbnail media.
    pub media_thumbnail_segment: String,
}

impl Default for SiteSelectors {
    fn default() -> Self {
        Self {
            item_title: "h1.web_ui__Text__text.web_ui__Text__title.web_ui__Text__left".into(),
            description: vec![
                "div[itemprop='description'] span span".into(),
                "div[itemprop='description']".into(),
            ],
            price: vec![
                "div[data-testid='item-price'] p.web_ui__Text__text".into(),
                "[data-testid='item-price']".into(),
            ],
            size: vec![
                "div[itemprop='size'] > span".into(),
                "[itemprop='size']".into(),
            ],
            condition: vec![
                "div[itemprop='status'] > span".into(),
                "[itemprop='status']".into(),
            ],
            color: vec![
                "div[itemprop='color'] > span".into(),
                "[itemprop='color']".into(),
            ],
            profile_username: "[data-testid='profile-username']".into(),
            profile_avatar: "div.web_ui__Image__circle img.web_ui__Image__content".into(),
            closet_count_heading: "h2.web_ui__Text__text.web_ui__Text__title.web_ui__Text__left"
                .into(),
            item_link: "a[href*='/items/']".into(),
            item_images: vec![
                "figure.item-description img.web_ui__Image__content".into(),
                "figure.item-photo img.web_ui__Image__content".into(),
                "li.web_ui__Carousel__content img.web_ui__Image__content".into(),
                "img.web_ui__Image__content:not([role='img'])".into(),
            ],
            any_image: "img.web_ui__Image__content".into(),
            error_banner: ".web_ui__Alert__content".into(),
            media_host: "vinted.net".into(),
            media_thumbnail_segment: "/t/".into(),
        }
    }
}

impl SiteSelectors {
    /// Every selector with a label, probe chains expanded in order.
    pub fn named(&self) -> Vec<(String, &str)> {
        let mut all = vec![
            ("item_title".to_string(), self.item_title.as_str()),
            ("profile_username".to_string(), self.profile_username.as_str()),
            ("profile_avatar".to_string(), self.profile_avatar.as_str()),
            ("closet_count_heading".to_string(), self.closet_count_heading.as_str()),
            ("item_link".to_string(), self.item_link.as_str()),
            ("any_image".to_string(), self.any_image.as_str()),
            ("error_banner".to_string(), self.error_banner.as_str()),
        ];
        let chains = [
            ("description", &self.description),
            ("price", &self.price),
            ("size", &self.size),
            ("condition", &self.condition),
            ("color", &self.color),
            ("item_images", &self.item_images),
        ];
        for (name, chain) in chains {
            for (idx, selector) in chain.iter().enumerate() {
                all.push((format!("{}[{}]", name, idx), selector.as_str()));
            }
        }
        all
    }
}
