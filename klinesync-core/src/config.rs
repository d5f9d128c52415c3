//! Sync configuration.
//!
//! `SyncOptions` is the loose, all-optional surface (TOML file or code).
//! `SyncOptions::resolve` validates it once and produces `SyncSettings` with
//! every default filled in. Nothing downstream re-checks or re-defaults.

use crate::data::binance::DEFAULT_ENDPOINT;
use crate::data::row::RowFormat;
use crate::data::store::BucketStore;
use crate::granularity::{Granularity, UnknownGranularity};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_DAY_START: &str = "2020-01-01";
pub const DEFAULT_DATA_DIR: &str = "./data";
pub const DEFAULT_SYNC_INTERVAL_MS: u64 = 60_000;
pub const DEFAULT_REQUEST_DELAY_MS: u64 = 100;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    InvalidInterval(#[from] UnknownGranularity),

    #[error("invalid start day '{value}' (expected YYYY-MM-DD)")]
    InvalidDayStart { value: String },

    #[error("sync interval must be a positive number of milliseconds")]
    InvalidSyncInterval,

    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Which series to sync and where it comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Series {
    /// Top-level folder, e.g. `BTC`.
    pub name: String,
    /// Second-level folder, e.g. `price` or `index`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Upstream symbol, e.g. `BTCUSDT` or `pBTCUSDT`.
    pub symbol: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

impl Series {
    pub fn new(name: &str, kind: &str, endpoint: &str, symbol: &str) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            symbol: symbol.into(),
            endpoint: endpoint.into(),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::MissingField("name"));
        }
        if self.kind.trim().is_empty() {
            return Err(ConfigError::MissingField("type"));
        }
        if self.symbol.trim().is_empty() {
            return Err(ConfigError::MissingField("symbol"));
        }
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::MissingField("endpoint"));
        }
        Ok(())
    }
}

/// HTTP(S) proxy, `{protocol}://{host}:{port}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_proxy_protocol")]
    pub protocol: String,
    pub host: String,
    pub port: u16,
}

fn default_proxy_protocol() -> String {
    "http".to_string()
}

impl ProxyConfig {
    pub fn url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.host, self.port)
    }
}

/// Optional knobs. Every field falls back to a documented default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    /// First day to sync (YYYY-MM-DD). Default `2020-01-01`.
    pub day_start: Option<String>,
    /// Granularity label. Default `1m`.
    pub interval: Option<String>,
    /// Root data folder. Default `./data`.
    pub data_dir: Option<PathBuf>,
    pub proxy: Option<ProxyConfig>,
    /// Write `", "`-joined CSV (default) or JSON lines.
    pub convert_to_csv: Option<bool>,
    /// Period between passes. Default 60000.
    pub sync_interval_ms: Option<u64>,
    /// Promote progress logs to info. Default off.
    pub verbose: Option<bool>,
    /// Delay after every upstream request. Default 100.
    pub request_delay_ms: Option<u64>,
    pub request_timeout_secs: Option<u64>,
}

/// Complete config file: `[series]` plus optional `[options]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    pub series: Series,
    #[serde(default)]
    pub options: SyncOptions,
}

impl SyncConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn resolve(self) -> Result<SyncSettings, ConfigError> {
        self.options.resolve(self.series)
    }
}

/// Validated settings with all defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub series: Series,
    pub day_start: NaiveDate,
    pub granularity: Granularity,
    pub data_dir: PathBuf,
    pub proxy: Option<ProxyConfig>,
    pub row_format: RowFormat,
    pub sync_interval: Duration,
    pub verbose: bool,
    pub request_delay: Duration,
    pub request_timeout: Duration,
}

impl SyncOptions {
    pub fn resolve(&self, series: Series) -> Result<SyncSettings, ConfigError> {
        series.validate()?;

        let day_start_raw = self.day_start.as_deref().unwrap_or(DEFAULT_DAY_START);
        let day_start = NaiveDate::parse_from_str(day_start_raw.trim(), "%Y-%m-%d").map_err(|_| {
            ConfigError::InvalidDayStart {
                value: day_start_raw.to_string(),
            }
        })?;

        let granularity = match self.interval.as_deref() {
            Some(label) => Granularity::from_label(label)?,
            None => Granularity::default(),
        };

        let sync_interval_ms = self.sync_interval_ms.unwrap_or(DEFAULT_SYNC_INTERVAL_MS);
        if sync_interval_ms == 0 {
            return Err(ConfigError::InvalidSyncInterval);
        }

        Ok(SyncSettings {
            series,
            day_start,
            granularity,
            data_dir: self
                .data_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            proxy: self.proxy.clone(),
            row_format: RowFormat::from_csv_toggle(self.convert_to_csv.unwrap_or(true)),
            sync_interval: Duration::from_millis(sync_interval_ms),
            verbose: self.verbose.unwrap_or(false),
            request_delay: Duration::from_millis(
                self.request_delay_ms.unwrap_or(DEFAULT_REQUEST_DELAY_MS),
            ),
            request_timeout: Duration::from_secs(
                self.request_timeout_secs
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            ),
        })
    }
}

impl SyncSettings {
    /// Midnight of the start day.
    pub fn start_instant(&self) -> NaiveDateTime {
        self.day_start.and_time(chrono::NaiveTime::MIN)
    }

    pub fn store(&self) -> BucketStore {
        BucketStore::new(
            &self.data_dir,
            &self.series.name,
            &self.series.kind,
            self.granularity.upstream_interval(),
            self.row_format,
        )
    }
}
