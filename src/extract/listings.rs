//! Listings pagination
//!
//! Pages are fetched one after another, up to `max_pages`, with a fixed pause
//! between fetches. Collection stops early once `min_results` records are in
//! hand or a page has no candidate elements. Each element is parsed on its
//! own; a bad element is skipped.

use crate::config::ListingsConfig;
use crate::error::{Result, SyncError};
use crate::warehouse::Record;
use reqwest::blocking::Client;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

const USER_AGENT: &str = "Mozilla/5.0 (compatible; warehouse-sync/0.1)";

/// Retrieves rendered page markup
pub trait PageSource {
    fn fetch(&mut self, url: &str) -> Result<String>;
}

/// Turns page markup into candidate records
pub trait PageParser {
    /// Raw markup of each candidate element on the page
    fn elements<'m>(&self, markup: &'m str) -> Vec<&'m str>;

    /// Normalize one element; an error skips only this element.
    fn parse_element(&self, element: &str) -> Result<Record>;
}

pub struct HttpPageSource {
    client: Client,
}

impl HttpPageSource {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| SyncError::Configuration(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

impl PageSource for HttpPageSource {
    fn fetch(&mut self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| SyncError::Extraction(format!("GET {}: {}", url, e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Extraction(format!("GET {} returned {}", url, status)));
        }
        response
            .text()
            .map_err(|e| SyncError::Extraction(format!("GET {}: {}", url, e)))
    }
}

/// URL of page `page` (1-based): the base URL for page 1, otherwise
/// `{base without .html}-pagina-{n}.html`.
pub fn page_url(base_url: &str, page: usize) -> String {
    if page <= 1 {
        return base_url.to_string();
    }
    let stem = base_url.strip_suffix(".html").unwrap_or(base_url);
    format!("{}-pagina-{}.html", stem, page)
}

/// What one fetched page contributed
#[derive(Clone, Debug, PartialEq)]
pub struct ListingsPage {
    pub number: usize,
    pub url: String,
    pub elements: usize,
    pub accepted: usize,
    pub skipped: usize,
}

#[derive(Debug, Default)]
pub struct ListingsExtraction {
    pub records: Vec<Record>,
    pub pages: Vec<ListingsPage>,
    /// Fetch failure that ended pagination, with the page URL
    pub failure: Option<(String, SyncError)>,
}

pub struct ListingsExtractor<'a> {
    source: &'a mut dyn PageSource,
    parser: &'a dyn PageParser,
    config: ListingsConfig,
}

impl<'a> ListingsExtractor<'a> {
    pub fn new(
        source: &'a mut dyn PageSource,
        parser: &'a dyn PageParser,
        config: &ListingsConfig,
    ) -> Self {
        Self {
            source,
            parser,
            config: config.clone(),
        }
    }

    pub fn extract(&mut self) -> ListingsExtraction {
        let mut out = ListingsExtraction::default();
        let mut number = 1;

        while out.records.len() < self.config.min_results && number <= self.config.max_pages {
            let url = page_url(&self.config.base_url, number);
            if number > 1 && !self.config.page_delay.is_zero() {
                thread::sleep(self.config.page_delay);
            }

            info!(page = number, url = %url, "fetching listings page");
            let markup = match self.source.fetch(&url) {
                Ok(markup) => markup,
                Err(e) => {
                    // pages already collected are kept
                    warn!(page = number, url = %url, error = %e, "page fetch failed, stopping");
                    out.failure = Some((url, e));
                    break;
                }
            };

            let elements = self.parser.elements(&markup);
            if elements.is_empty() {
                info!(page = number, "no listings on page, end of data");
                break;
            }

            let mut page = ListingsPage {
                number,
                url,
                elements: elements.len(),
                accepted: 0,
                skipped: 0,
            };
            for element in elements {
                match self.parser.parse_element(element) {
                    Ok(record) => {
                        out.records.push(record);
                        page.accepted += 1;
                        if out.records.len() >= self.config.min_results {
                            debug!(min_results = self.config.min_results, "result threshold reached");
                            break;
                        }
                    }
                    Err(e) => {
                        page.skipped += 1;
                        warn!(page = number, error = %e, "skipping listing element");
                    }
                }
            }
            info!(
                page = number,
                accepted = page.accepted,
                skipped = page.skipped,
                total = out.records.len(),
                "listings page processed"
            );
            out.pages.push(page);
            number += 1;
        }

        out
    }
}
