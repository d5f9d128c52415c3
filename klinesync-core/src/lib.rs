//! klinesync core: incremental kline synchronization to bucketed files.
//!
//! This crate contains:
//! - Granularity table (upstream interval, bucket width, expected rows)
//! - Window generator producing gapless fixed-width buckets up to "now"
//! - Completeness checker (line-count heuristic, current bucket always stale)
//! - Kline source trait, a Binance-style REST source and the fetcher on top
//! - Bucket file store
//! - Sync orchestrator with a reentrancy guard and periodic worker

pub mod clock;
pub mod completeness;
pub mod config;
pub mod data;
pub mod granularity;
pub mod sync;
pub mod window;

pub use clock::{Clock, FixedClock, SystemClock};
pub use completeness::Completeness;
pub use config::{ConfigError, ProxyConfig, Series, SyncConfig, SyncOptions, SyncSettings};
pub use granularity::Granularity;
pub use sync::{BucketStatus, PassReport, SyncError, SyncTask};
pub use window::{generate_buckets, Bucket};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: the task can be shared with a signal handler or
    /// another thread.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<SyncTask>();
        require_sync::<SyncTask>();
        require_send::<SyncSettings>();
        require_sync::<SyncSettings>();
        require_send::<data::Fetcher>();
        require_sync::<data::Fetcher>();
        require_send::<data::BucketStore>();
        require_sync::<data::BucketStore>();
        require_send::<SyncError>();
    }
}
