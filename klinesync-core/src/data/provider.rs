//! Kline source trait and structured error types.
//!
//! The KlineSource trait abstracts over the upstream REST endpoint so the
//! fetcher and the sync loop can be driven by a mock in tests.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// One raw candle as returned upstream:
/// `[openTime, open, high, low, close, volume, closeTime, quoteVolume,
///   trades, takerBuyBase, takerBuyQuote, ignore]`.
///
/// Index endpoints return only the price columns, so every accessor is lenient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawKline(pub Vec<Value>);

impl RawKline {
    /// Epoch millis at `idx`, accepting numbers or numeric strings.
    pub fn millis(&self, idx: usize) -> Option<i64> {
        match self.0.get(idx)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Field at `idx` as its exact upstream text. Missing fields are empty.
    pub fn text(&self, idx: usize) -> String {
        match self.0.get(idx) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            _ => String::new(),
        }
    }
}

/// Parameters of one upstream request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KlineRequest {
    pub symbol: String,
    pub interval: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub limit: usize,
}

impl KlineRequest {
    pub fn start_millis(&self) -> i64 {
        self.start.and_utc().timestamp_millis()
    }

    pub fn end_millis(&self) -> i64 {
        self.end.and_utc().timestamp_millis()
    }

    /// Query pairs in the order they are sent.
    pub fn query(&self) -> Vec<(&'static str, String)> {
        vec![
            ("symbol", self.symbol.clone()),
            ("startTime", self.start_millis().to_string()),
            ("endTime", self.end_millis().to_string()),
            ("interval", self.interval.clone()),
            ("limit", self.limit.to_string()),
        ]
    }
}

/// Structured error types for upstream fetches.
///
/// None of these abort a sync pass; they are logged and the bucket is retried
/// on the next pass.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("HTTP {status} for {url}")]
    HttpStatus { status: u16, url: String },

    #[error("rate limited by provider (HTTP {status})")]
    RateLimited { status: u16 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("http client setup failed: {0}")]
    ClientSetup(String),

    #[error("fetch error: {0}")]
    Other(String),
}

/// A successful upstream response.
#[derive(Debug, Clone)]
pub struct KlinePage {
    /// Fully resolved request URL, for diagnostics.
    pub url: String,
    pub klines: Vec<RawKline>,
}

/// Trait for upstream kline sources.
///
/// Implementations issue exactly one request per call; paging, delays and
/// normalization live in the fetcher above this trait.
pub trait KlineSource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    fn fetch_klines(&self, request: &KlineRequest) -> Result<KlinePage, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    #[test]
    fn raw_kline_keeps_exact_text() {
        let k: RawKline = serde_json::from_value(json!([
            1577836800000i64,
            "7195.24000000",
            "7196.25000000",
            "7183.14000000",
            "7186.68000000",
            "51.64281200",
            1577836859999i64,
            "371233.64398413",
            493,
            "19.24952800",
            "138378.98457591",
            "0"
        ]))
        .unwrap();

        assert_eq!(k.millis(0), Some(1577836800000));
        assert_eq!(k.text(1), "7195.24000000");
        assert_eq!(k.text(8), "493");
        assert_eq!(k.text(20), "");
    }

    #[test]
    fn request_query_uses_epoch_millis() {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let req = KlineRequest {
            symbol: "BTCUSDT".into(),
            interval: "1m".into(),
            start,
            end: start + chrono::Duration::seconds(3599),
            limit: 1000,
        };
        let q = req.query();
        assert_eq!(q[1], ("startTime", "1577836800000".to_string()));
        assert_eq!(q[2], ("endTime", "1577840399000".to_string()));
        assert_eq!(q[4], ("limit", "1000".to_string()));
    }

    #[test]
    fn rate_limit_reports_the_status() {
        let err = FetchError::RateLimited { status: 429 };
        assert_eq!(err.to_string(), "rate limited by provider (HTTP 429)");
    }
}
