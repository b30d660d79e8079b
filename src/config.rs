//! Run configuration
//!
//! Built exactly once at process start (from the environment, after reading a
//! `.env` file if present) and handed to each component by reference.

use crate::error::{Result, SyncError};
use chrono::NaiveDate;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Connection parameters for one PostgreSQL database
#[derive(Clone, Debug, PartialEq)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub db_name: String,
}

/// Exchange-rate statistics API
#[derive(Clone, Debug, PartialEq)]
pub struct ApiConfig {
    pub base_url: String,
    pub endpoint: String,
    pub currency_code: String,
    pub page_size: usize,
    pub timeout: Duration,
}

impl ApiConfig {
    /// `{base}{endpoint}/{currency}`
    pub fn series_url(&self) -> String {
        format!(
            "{}{}/{}",
            self.base_url.trim_end_matches('/'),
            self.endpoint,
            self.currency_code
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ListingsConfig {
    pub base_url: String,
    pub max_pages: usize,
    pub min_results: usize,
    pub page_delay: Duration,
    pub timeout: Duration,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SyncConfig {
    pub origin: Option<DatabaseConfig>,
    pub cloud: DatabaseConfig,
    pub api: Option<ApiConfig>,
    pub listings: ListingsConfig,
    /// First day pulled when the destination holds no quotations yet
    pub epoch: NaiveDate,
    pub load_batch_size: usize,
    pub skip_existing: bool,
    pub origin_csv_dir: PathBuf,
}

const DEFAULT_LISTINGS_URL: &str = "https://www.zonaprop.com.ar/terrenos-venta-posadas.html";

impl SyncConfig {
    /// Load from the process environment (after `.env`).
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(&lookup);

        let cloud = vars.database("DB_CLOUD")?.ok_or_else(|| {
            SyncError::Configuration("DB_CLOUD_HOST must be set".to_string())
        })?;
        let origin = vars.database("DB_ORIGIN")?;

        let timeout = Duration::from_secs(vars.parsed("SYNC_HTTP_TIMEOUT_SECS", 60)?);

        let api = match vars.get("API_BASE_URL") {
            Some(base_url) => Some(ApiConfig {
                base_url,
                endpoint: vars.required("API_ENDPOINT")?,
                currency_code: vars.required("API_CURRENCY_CODE")?,
                page_size: vars.parsed("SYNC_PAGE_SIZE", 1000)?,
                timeout,
            }),
            None => None,
        };
        if let Some(api) = &api {
            if api.page_size == 0 {
                return Err(SyncError::Configuration(
                    "SYNC_PAGE_SIZE must be greater than zero".to_string(),
                ));
            }
        }

        let listings = ListingsConfig {
            base_url: vars
                .get("LISTINGS_URL")
                .unwrap_or_else(|| DEFAULT_LISTINGS_URL.to_string()),
            max_pages: vars.parsed("LISTINGS_MAX_PAGES", 2)?,
            min_results: vars.parsed("LISTINGS_MIN_RESULTS", 20)?,
            page_delay: Duration::from_secs(vars.parsed("LISTINGS_DELAY_SECS", 3)?),
            timeout,
        };

        let epoch = match vars.get("SYNC_EPOCH") {
            Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|e| {
                SyncError::Configuration(format!("SYNC_EPOCH '{}' is not a date: {}", raw, e))
            })?,
            None => default_epoch(),
        };

        Ok(Self {
            origin,
            cloud,
            api,
            listings,
            epoch,
            load_batch_size: vars.parsed("SYNC_LOAD_BATCH_SIZE", 1000)?.max(1),
            skip_existing: vars.flag("SYNC_SKIP_EXISTING"),
            origin_csv_dir: PathBuf::from(
                vars.get("ORIGIN_CSV_DIR").unwrap_or_else(|| "data".to_string()),
            ),
        })
    }

    /// Origin connection, required by replication and seeding.
    pub fn origin(&self) -> Result<&DatabaseConfig> {
        self.origin.as_ref().ok_or_else(|| {
            SyncError::Configuration("DB_ORIGIN_HOST must be set for this pipeline".to_string())
        })
    }

    /// API settings, required by the quotations pipeline.
    pub fn api(&self) -> Result<&ApiConfig> {
        self.api.as_ref().ok_or_else(|| {
            SyncError::Configuration("API_BASE_URL must be set for this pipeline".to_string())
        })
    }
}

fn default_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(2002, 1, 1).unwrap_or(NaiveDate::MIN)
}

struct Vars<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<'a, F: Fn(&str) -> Option<String>> Vars<'a, F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> Result<String> {
        self.get(key)
            .ok_or_else(|| SyncError::Configuration(format!("{} must be set", key)))
    }

    fn parsed<T: FromStr>(&self, key: &str, default: T) -> Result<T> {
        match self.get(key) {
            Some(raw) => raw.parse().map_err(|_| {
                SyncError::Configuration(format!("{} has an invalid value: '{}'", key, raw))
            }),
            None => Ok(default),
        }
    }

    fn flag(&self, key: &str) -> bool {
        self.get(key)
            .map(|s| s == "1" || s.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    /// A connection group is present once its `_HOST` is set; then every field is required.
    fn database(&self, prefix: &str) -> Result<Option<DatabaseConfig>> {
        let host = match self.get(&format!("{}_HOST", prefix)) {
            Some(host) => host,
            None => return Ok(None),
        };
        Ok(Some(DatabaseConfig {
            host,
            port: self.parsed(&format!("{}_PORT", prefix), 5432)?,
            user: self.required(&format!("{}_USER", prefix))?,
            password: self.get(&format!("{}_PASSWORD", prefix)).unwrap_or_default(),
            db_name: self.required(&format!("{}_NAME", prefix))?,
        }))
    }
}
