//! Upstream access and on-disk bucket files.

pub mod binance;
pub mod fetcher;
pub mod provider;
pub mod row;
pub mod store;

pub use binance::{BinanceSource, DEFAULT_ENDPOINT};
pub use fetcher::{FetchOutcome, Fetcher};
pub use provider::{FetchError, KlinePage, KlineRequest, KlineSource, RawKline};
pub use row::{Row, RowFormat};
pub use store::{BucketStore, StoreError};
