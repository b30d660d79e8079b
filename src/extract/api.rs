//! Exchange-rate API extraction
//!
//! Offset/limit pagination inside one date window. A page with zero raw
//! results ends the window, as does a page shorter than the page size.
//! Items that fail coercion are dropped; the raw count still drives
//! termination.

use super::DateWindow;
use crate::config::ApiConfig;
use crate::error::{Result, SyncError};
use crate::schema::SemanticType;
use crate::warehouse::{Record, Value};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use std::fmt;
use tracing::{debug, info, warn};

const USER_AGENT: &str = "Mozilla/5.0 (compatible; warehouse-sync/0.1)";

/// Value written to `quotations.source`
pub const QUOTATION_SOURCE: &str = "BCRA";

const DATE: SemanticType = SemanticType::Date;
const RATE: SemanticType = SemanticType::Numeric {
    precision: 10,
    scale: 4,
};

/// One `(range, offset, limit)` request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRequest {
    pub window: DateWindow,
    pub offset: usize,
    pub limit: usize,
}

impl fmt::Display for PageRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} offset={} limit={}", self.window, self.offset, self.limit)
    }
}

/// Response body. Accepts both the normalized field names and the
/// source's native ones.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ApiPage {
    #[serde(default)]
    pub results: Vec<RawQuotation>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawQuotation {
    #[serde(default, alias = "fecha")]
    pub date: serde_json::Value,
    #[serde(default, alias = "detalle")]
    pub detail: Vec<RawDetail>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RawDetail {
    #[serde(default, alias = "codigoMoneda")]
    pub code: String,
    #[serde(default, alias = "tipoCotizacion")]
    pub value: serde_json::Value,
}

/// Fetches one page of the series
pub trait ApiTransport {
    fn fetch_page(&mut self, request: &PageRequest) -> Result<ApiPage>;
}

/// Blocking HTTP transport against `{base}{endpoint}/{currency}`
pub struct HttpApiTransport {
    client: Client,
    url: String,
}

impl HttpApiTransport {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| SyncError::Configuration(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: config.series_url(),
        })
    }
}

/// Query string of one page request
pub fn query_params(request: &PageRequest) -> [(&'static str, String); 4] {
    [
        ("fechadesde", request.window.from.format("%Y-%m-%d").to_string()),
        ("fechahasta", request.window.to.format("%Y-%m-%d").to_string()),
        ("limit", request.limit.to_string()),
        ("offset", request.offset.to_string()),
    ]
}

/// Any non-2xx status fails the request.
pub fn check_status(url: &str, request: &PageRequest, status: StatusCode, body: &str) -> Result<()> {
    if status.is_success() {
        return Ok(());
    }
    Err(SyncError::Extraction(format!(
        "GET {} ({}) returned {}: {}",
        url,
        request,
        status,
        body.chars().take(200).collect::<String>()
    )))
}

impl ApiTransport for HttpApiTransport {
    fn fetch_page(&mut self, request: &PageRequest) -> Result<ApiPage> {
        let response = self
            .client
            .get(&self.url)
            .query(&query_params(request))
            .send()
            .map_err(|e| SyncError::Extraction(format!("GET {} ({}): {}", self.url, request, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return check_status(&self.url, request, status, &body).map(|_| ApiPage::default());
        }

        response.json::<ApiPage>().map_err(|e| {
            SyncError::Extraction(format!("Invalid response body ({}): {}", request, e))
        })
    }
}

/// Normalizes one raw item into a `quotations` row.
///
/// `Ok(None)` when the item carries no detail for `currency_code`. Items
/// dated outside `window` are rejected.
pub fn normalize_quotation(
    raw: &RawQuotation,
    currency_code: &str,
    window: &DateWindow,
) -> Result<Option<Record>> {
    let detail = match raw
        .detail
        .iter()
        .find(|d| d.code.eq_ignore_ascii_case(currency_code))
    {
        Some(detail) => detail,
        None => return Ok(None),
    };

    let date = Value::coerce_json(DATE, &raw.date)?;
    if date.is_null() {
        return Err(SyncError::Parse("quotation without a date".to_string()));
    }
    if !date.as_date().map_or(false, |day| window.contains(day)) {
        return Err(SyncError::Parse(format!(
            "quotation {} outside requested window {}",
            date, window
        )));
    }
    let rate = Value::coerce_json(RATE, &detail.value)?;
    if rate.is_null() {
        return Err(SyncError::Parse(format!("quotation {} without a rate", date)));
    }

    Ok(Some(
        Record::new()
            .with("date", date)
            .with("currencyCode", currency_code)
            .with("exchangeRate", rate)
            .with("source", QUOTATION_SOURCE),
    ))
}

/// Paginated extraction of one currency series
pub struct QuotationExtractor<'a> {
    transport: &'a mut dyn ApiTransport,
    currency_code: String,
    page_size: usize,
    requests: usize,
}

impl<'a> QuotationExtractor<'a> {
    pub fn new(transport: &'a mut dyn ApiTransport, currency_code: &str, page_size: usize) -> Self {
        Self {
            transport,
            currency_code: currency_code.to_string(),
            page_size: page_size.max(1),
            requests: 0,
        }
    }

    /// Requests issued so far
    pub fn requests(&self) -> usize {
        self.requests
    }

    /// Lazy page sequence for `window`; each item is one page of normalized rows.
    pub fn pages(&mut self, window: DateWindow) -> QuotationPages<'_, 'a> {
        QuotationPages {
            extractor: self,
            window,
            offset: 0,
            done: false,
        }
    }

    /// Every row of `window`. A transport failure fails the whole window.
    pub fn extract_window(&mut self, window: DateWindow) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        for page in self.pages(window) {
            records.extend(page?);
        }
        info!(window = %window, records = records.len(), "window extracted");
        Ok(records)
    }

    fn fetch(&mut self, request: &PageRequest) -> Result<(usize, Vec<Record>)> {
        self.requests += 1;
        debug!(request = %request, "requesting page");
        let page = self.transport.fetch_page(request)?;
        let raw_count = page.results.len();

        let mut records = Vec::with_capacity(raw_count);
        for raw in &page.results {
            match normalize_quotation(raw, &self.currency_code, &request.window) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => debug!(date = %raw.date, "no detail for currency, skipping"),
                Err(e) => warn!(request = %request, error = %e, "dropping quotation"),
            }
        }
        Ok((raw_count, records))
    }
}

/// Iterator over the pages of one window
pub struct QuotationPages<'e, 'a> {
    extractor: &'e mut QuotationExtractor<'a>,
    window: DateWindow,
    offset: usize,
    done: bool,
}

impl<'e, 'a> Iterator for QuotationPages<'e, 'a> {
    type Item = Result<Vec<Record>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let request = PageRequest {
            window: self.window,
            offset: self.offset,
            limit: self.extractor.page_size,
        };

        match self.extractor.fetch(&request) {
            Ok((0, _)) => {
                self.done = true;
                None
            }
            Ok((raw_count, records)) => {
                if raw_count < request.limit {
                    self.done = true;
                } else {
                    self.offset += request.limit;
                }
                Some(Ok(records))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
