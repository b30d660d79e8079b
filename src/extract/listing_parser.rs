//! Listing card parser
//!
//! Works on the rendered results page of the listings site: one posting card
//! per listing, with the description link, location, price block and feature
//! spans identified by their CSS module class names.

use super::listings::PageParser;
use crate::error::{Result, SyncError};
use crate::warehouse::{round_to, Record, Value};
use chrono::{Local, NaiveDate};
use regex::Regex;
use uuid::Uuid;

const CARD_CLASS: &str = "postingCard-module__posting-container";
const DESCRIPTION_CLASS: &str = "postingCard-module__posting-description";
const ADDRESS_CLASS: &str = "postingLocations-module__location-address";
const CITY_CLASS: &str = "postingLocations-module__location-text";
const PRICE_CLASS: &str = "postingPrices-module__price";
const MAIN_FEATURE_CLASS: &str = "postingMainFeatures-module__posting-main-features-span";
const GENERAL_FEATURE_CLASS: &str = "generalFeaturesProperty-module__description-text";

const TITLE_MAX_CHARS: usize = 100;
const CURRENCY_MAX_CHARS: usize = 10;

pub struct ListingCardParser {
    site_origin: String,
    scrape_date: NaiveDate,
    card_start: Regex,
    description: Regex,
    address: Regex,
    city: Regex,
    price_block: Regex,
    main_feature: Regex,
    general_feature: Regex,
    link: Regex,
    tag: Regex,
    whitespace: Regex,
    listing_id: Regex,
    first_sentence: Regex,
    description_price: Regex,
    block_price: Regex,
    total_area: Regex,
    frontage: Regex,
    depth: Regex,
    described_area: Regex,
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| SyncError::Configuration(format!("invalid pattern {}: {}", pattern, e)))
}

/// Matches `<tag ... class="... class_name ...">inner</tag>`, capturing `inner`.
fn element(tag: &str, class_name: &str) -> Result<Regex> {
    compile(&format!(
        r#"(?s)<{tag}\b[^>]*class="[^"]*{class}[^"]*"[^>]*>(.*?)</{tag}>"#,
        tag = tag,
        class = regex::escape(class_name)
    ))
}

impl ListingCardParser {
    /// `base_url` is any URL on the listings site; relative links are
    /// resolved against its scheme and host.
    pub fn new(base_url: &str) -> Result<Self> {
        let site_origin = compile(r"^(https?://[^/]+)")?
            .captures(base_url)
            .map(|c| c[1].to_string())
            .unwrap_or_default();

        Ok(Self {
            site_origin,
            scrape_date: Local::now().date_naive(),
            card_start: compile(&format!(
                r#"<div\b[^>]*class="[^"]*{}[^"]*"[^>]*>"#,
                regex::escape(CARD_CLASS)
            ))?,
            description: element("h3", DESCRIPTION_CLASS)?,
            address: element("div", ADDRESS_CLASS)?,
            city: element("h2", CITY_CLASS)?,
            price_block: element("div", PRICE_CLASS)?,
            main_feature: element("span", MAIN_FEATURE_CLASS)?,
            general_feature: element("span", GENERAL_FEATURE_CLASS)?,
            link: compile(r#"(?s)<a\b[^>]*href="([^"]+)"[^>]*>(.*?)</a>"#)?,
            tag: compile(r"<[^>]*>")?,
            whitespace: compile(r"\s+")?,
            listing_id: compile(r"-id-(\d+)\.html")?,
            first_sentence: compile(r"^(.+?)[.\-–]")?,
            description_price: compile(r"(?i)precio[:\s]*([a-z$]+)?\s*([\d.,]+)")?,
            block_price: compile(r"^([A-Z$]+)?\s*([\d.]+)")?,
            total_area: compile(r"(\d+)\s*m[2²]\s*tot\.")?,
            frontage: compile(r"Frente del terreno \(mts\)\s*:\s*([\d.,]+)")?,
            depth: compile(r"Largo del terreno \(mts\)\s*:\s*([\d.,]+)")?,
            described_area: compile(r"(?i)superficie:\s*([\d.,]+)\s*m[2²]")?,
        })
    }

    pub fn with_scrape_date(mut self, date: NaiveDate) -> Self {
        self.scrape_date = date;
        self
    }

    fn text(&self, markup: &str) -> String {
        let stripped = self.tag.replace_all(markup, " ");
        let decoded = stripped
            .replace("&nbsp;", " ")
            .replace("&sup2;", "²")
            .replace("&quot;", "\"")
            .replace("&#39;", "'")
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&amp;", "&");
        self.whitespace.replace_all(decoded.trim(), " ").to_string()
    }

    fn first_text(&self, pattern: &Regex, markup: &str) -> Option<String> {
        pattern
            .captures(markup)
            .map(|c| self.text(&c[1]))
            .filter(|t| !t.is_empty())
    }

    fn absolute(&self, href: &str) -> String {
        if href.starts_with("http://") || href.starts_with("https://") {
            href.to_string()
        } else {
            format!("{}{}", self.site_origin, href)
        }
    }

    fn title(&self, description: &str) -> Option<String> {
        if description.is_empty() {
            return None;
        }
        let title = match self.first_sentence.captures(description) {
            Some(c) => c[1].trim().to_string(),
            None => description.chars().take(TITLE_MAX_CHARS).collect::<String>().trim().to_string(),
        };
        Some(title)
    }

    /// `(currency, value)` from the description first, then the price block.
    fn price(&self, description: &str, card: &str) -> (Option<String>, Option<f64>) {
        if let Some(c) = self.description_price.captures(description) {
            let currency = c.get(1).map(|m| m.as_str()).unwrap_or("");
            return (Some(currency_code(currency)), parse_grouped(&c[2]));
        }

        let block = match self.first_text(&self.price_block, card) {
            Some(block) => block,
            None => return (None, None),
        };
        let compact = block.replace('.', "").replace(',', ".");
        if let Some(c) = self.block_price.captures(compact.trim()) {
            let currency = c.get(1).map(|m| m.as_str()).unwrap_or("");
            return (Some(currency_code(currency)), c[2].parse().ok());
        }
        if block.to_lowercase().contains("consultar precio") {
            return (Some("Consultar".to_string()), None);
        }
        (None, None)
    }

    fn feature(&self, pattern: &Regex, card: &str) -> Option<f64> {
        self.general_feature
            .captures_iter(card)
            .map(|c| self.text(&c[1]))
            .find_map(|text| {
                pattern
                    .captures(&text)
                    .and_then(|m| m[1].replace(',', ".").parse::<f64>().ok())
            })
    }

    fn land_area(
        &self,
        card: &str,
        description: &str,
        frontage: Option<f64>,
        depth: Option<f64>,
    ) -> Option<f64> {
        let total = self
            .main_feature
            .captures_iter(card)
            .map(|c| self.text(&c[1]))
            .find_map(|text| {
                self.total_area
                    .captures(&text)
                    .and_then(|m| m[1].parse::<f64>().ok())
            });
        if total.is_some() {
            return total;
        }
        if let (Some(f), Some(d)) = (frontage, depth) {
            return Some(f * d);
        }
        self.described_area
            .captures(description)
            .and_then(|c| parse_grouped(&c[1]))
    }
}

/// `$` and its variants mean dollars; anything else is kept upper-cased.
fn currency_code(raw: &str) -> String {
    let upper = raw.to_uppercase();
    if upper.is_empty() || upper.contains('$') {
        "USD".to_string()
    } else {
        upper.chars().take(CURRENCY_MAX_CHARS).collect()
    }
}

/// `25.000,50` style numbers: dots group thousands, comma is decimal.
fn parse_grouped(raw: &str) -> Option<f64> {
    raw.replace('.', "").replace(',', ".").parse().ok()
}

fn numeric(value: Option<f64>, scale: u8) -> Value {
    value.map(|v| Value::Numeric(round_to(v, scale))).into()
}

impl PageParser for ListingCardParser {
    fn elements<'m>(&self, markup: &'m str) -> Vec<&'m str> {
        let starts: Vec<usize> = self.card_start.find_iter(markup).map(|m| m.start()).collect();
        starts
            .iter()
            .enumerate()
            .map(|(i, &start)| {
                let end = starts.get(i + 1).copied().unwrap_or(markup.len());
                &markup[start..end]
            })
            .collect()
    }

    fn parse_element(&self, card: &str) -> Result<Record> {
        let heading = self.description.captures(card).map(|c| c[1].to_string());
        let link = heading.as_deref().and_then(|h| self.link.captures(h));

        let (url, description) = match (&link, &heading) {
            (Some(c), _) => (Some(self.absolute(&c[1])), self.text(&c[2])),
            (None, Some(h)) => (None, self.text(h)),
            (None, None) => (None, String::new()),
        };
        let url = url.ok_or_else(|| SyncError::Parse("listing card without a link".to_string()))?;

        let listing_id = match self.listing_id.captures(&url) {
            Some(c) => c[1].to_string(),
            None => Uuid::new_v5(&Uuid::NAMESPACE_URL, url.as_bytes()).to_string(),
        };

        let location: Vec<String> = [&self.address, &self.city]
            .iter()
            .filter_map(|pattern| self.first_text(pattern, card))
            .collect();
        let (currency, price) = self.price(&description, card);
        let frontage = self.feature(&self.frontage, card);
        let depth = self.feature(&self.depth, card);
        let land_area = self.land_area(card, &description, frontage, depth);

        Ok(Record::new()
            .with("listingId", listing_id)
            .with("title", self.title(&description))
            .with(
                "location",
                if location.is_empty() { None } else { Some(location.join(", ")) },
            )
            .with("priceCurrency", currency)
            .with("priceValue", numeric(price, 2))
            .with("landAreaM2", numeric(land_area, 2))
            .with("frontageM", numeric(frontage, 2))
            .with("depthM", numeric(depth, 2))
            .with("listingUrl", url)
            .with(
                "description",
                if description.is_empty() { None } else { Some(description) },
            )
            .with("scrapeDate", self.scrape_date))
    }
}
