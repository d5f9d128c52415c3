//! Fetcher: one upstream request per explicit time range, normalized to rows.
//!
//! Failures never propagate. They come back inside a [`FetchOutcome`] with no
//! rows, and an empty outcome means "no data, do not overwrite".

use super::provider::{FetchError, KlineRequest, KlineSource};
use super::row::Row;
use crate::clock::Clock;
use crate::granularity::{Granularity, MAX_ROWS_PER_REQUEST};
use crate::window::TIME_FORMAT;
use chrono::NaiveDateTime;
use std::sync::Arc;
use std::time::Duration;

/// Post-request courtesy delay (Binance allows 2400 requests per minute).
pub const DEFAULT_REQUEST_DELAY: Duration = Duration::from_millis(100);

/// Result of fetching one range.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    /// Resolved request URL, when the request got far enough to have one.
    pub url: Option<String>,
    pub rows: Vec<Row>,
    pub error: Option<FetchError>,
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// True when there is nothing worth persisting.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn failed(url: Option<String>, error: FetchError) -> Self {
        Self {
            url,
            rows: Vec::new(),
            error: Some(error),
        }
    }
}

pub struct Fetcher {
    source: Arc<dyn KlineSource>,
    clock: Arc<dyn Clock>,
    delay: Duration,
}

impl Fetcher {
    pub fn new(source: Arc<dyn KlineSource>, clock: Arc<dyn Clock>) -> Self {
        Self {
            source,
            clock,
            delay: DEFAULT_REQUEST_DELAY,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Fetch `[start, end]` for `symbol`. The delay applies whatever happens.
    pub fn fetch(
        &self,
        symbol: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
        granularity: Granularity,
    ) -> FetchOutcome {
        let request = KlineRequest {
            symbol: symbol.to_string(),
            interval: granularity.upstream_interval().to_string(),
            start,
            end,
            limit: MAX_ROWS_PER_REQUEST,
        };

        let result = self.source.fetch_klines(&request);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        let page = match result {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!(
                    symbol,
                    start = %start.format(TIME_FORMAT),
                    end = %end.format(TIME_FORMAT),
                    error = %e,
                    "can not get k-data for symbol[{symbol}]"
                );
                return FetchOutcome::failed(None, e);
            }
        };

        let now = self.clock.now();
        let rows = match page
            .klines
            .iter()
            .map(|raw| Row::from_raw(raw, now))
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(symbol, url = %page.url, error = %e, "can not parse k-data for symbol[{symbol}]");
                return FetchOutcome::failed(Some(page.url), e);
            }
        };

        if rows.is_empty() {
            tracing::warn!(symbol, url = %page.url, "invalid k-data for symbol[{symbol}]");
        }

        FetchOutcome {
            url: Some(page.url),
            rows,
            error: None,
        }
    }
}
