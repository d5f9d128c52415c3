//! Binance-style REST kline source.
//!
//! Works against any endpoint that speaks the `/api/v3/klines` query shape,
//! including `/fapi/v1/marketKlines` for premium-index symbols. One blocking
//! GET per call; no retries here, the next sync pass is the retry.

use super::provider::{FetchError, KlinePage, KlineRequest, KlineSource, RawKline};
use crate::config::ProxyConfig;
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "https://api.binance.com/api/v3/klines";

/// REST kline source backed by a blocking reqwest client.
pub struct BinanceSource {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl BinanceSource {
    pub fn new(
        endpoint: impl Into<String>,
        proxy: Option<&ProxyConfig>,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let mut builder = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("klinesync/", env!("CARGO_PKG_VERSION")));

        if let Some(proxy) = proxy {
            let proxy = reqwest::Proxy::all(proxy.url())
                .map_err(|e| FetchError::ClientSetup(format!("invalid proxy: {e}")))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| FetchError::ClientSetup(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl KlineSource for BinanceSource {
    fn name(&self) -> &str {
        "binance_rest"
    }

    fn fetch_klines(&self, request: &KlineRequest) -> Result<KlinePage, FetchError> {
        let http_request = self
            .client
            .get(&self.endpoint)
            .query(&request.query())
            .build()
            .map_err(|e| FetchError::Other(format!("build request: {e}")))?;
        let url = http_request.url().to_string();

        let resp = self.client.execute(http_request).map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(e.to_string())
            } else {
                FetchError::NetworkUnreachable(e.to_string())
            }
        })?;

        let status = resp.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS
            || status == reqwest::StatusCode::IM_A_TEAPOT
        {
            return Err(FetchError::RateLimited {
                status: status.as_u16(),
            });
        }

        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url,
            });
        }

        let klines: Vec<RawKline> = resp.json().map_err(|e| {
            FetchError::ResponseFormatChanged(format!(
                "failed to parse klines for {}: {e}",
                request.symbol
            ))
        })?;

        Ok(KlinePage { url, klines })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_without_proxy() {
        let source = BinanceSource::new(DEFAULT_ENDPOINT, None, Duration::from_secs(5)).unwrap();
        assert_eq!(source.endpoint(), DEFAULT_ENDPOINT);
        assert_eq!(source.name(), "binance_rest");
    }

    #[test]
    fn builds_with_proxy() {
        let proxy = ProxyConfig {
            protocol: "http".into(),
            host: "127.0.0.1".into(),
            port: 8080,
        };
        assert!(BinanceSource::new(DEFAULT_ENDPOINT, Some(&proxy), Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn unreachable_host_is_a_network_error() {
        let source = BinanceSource::new(
            "http://127.0.0.1:9/api/v3/klines",
            None,
            Duration::from_secs(2),
        )
        .unwrap();
        let start = chrono::NaiveDate::from_ymd_opt(2020, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let req = KlineRequest {
            symbol: "BTCUSDT".into(),
            interval: "1m".into(),
            start,
            end: start + chrono::Duration::seconds(59),
            limit: 1000,
        };
        let err = source.fetch_klines(&req).unwrap_err();
        assert!(matches!(
            err,
            FetchError::NetworkUnreachable(_) | FetchError::Timeout(_)
        ));
    }
}
