//! Sync orchestrator.
//!
//! One pass walks every bucket from the start day to "now", oldest first:
//! window generator -> completeness check -> fetch -> persist. A failed fetch
//! leaves its bucket for the next pass; a filesystem error ends the pass.
//!
//! `run()` starts a background worker that performs one pass immediately and
//! then one per `sync_interval`. Passes never overlap: a pass requested while
//! another is in flight is dropped, not queued. `stop()` prevents further
//! passes but does not interrupt the one in flight.

use crate::clock::{Clock, SystemClock};
use crate::completeness::{self, Completeness};
use crate::config::SyncSettings;
use crate::data::binance::BinanceSource;
use crate::data::fetcher::Fetcher;
use crate::data::provider::{FetchError, KlineSource};
use crate::data::store::{BucketStore, StoreError};
use crate::window::{generate_buckets, Bucket, TIME_FORMAT};
use chrono::NaiveDateTime;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("sync task is already running")]
    AlreadyStarted,

    #[error("failed to spawn sync worker: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Progress messages are `info` when verbose, `debug` otherwise.
macro_rules! progress {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            tracing::info!($($arg)+);
        } else {
            tracing::debug!($($arg)+);
        }
    };
}

/// Summary of one completed pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    /// The pass's notion of "now".
    pub now: Option<NaiveDateTime>,
    pub buckets: usize,
    /// Complete on disk, not fetched.
    pub skipped: usize,
    /// Upstream requests issued.
    pub fetched: usize,
    pub written: usize,
    /// Requests that succeeded but returned no rows.
    pub empty: usize,
    /// Requests that failed.
    pub failed: usize,
}

/// Classification of one bucket, as reported by [`SyncTask::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BucketStatus {
    pub bucket: Bucket,
    pub state: Completeness,
    /// Rows on disk, if the file exists.
    pub rows: Option<usize>,
}

struct Inner {
    settings: SyncSettings,
    store: BucketStore,
    fetcher: Fetcher,
    clock: Arc<dyn Clock>,
    running: AtomicBool,
}

/// Clears the reentrancy flag when the pass ends, however it ends.
struct PassGuard<'a>(&'a AtomicBool);

impl<'a> PassGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Inner {
    fn run_pass(&self) -> Result<Option<PassReport>, SyncError> {
        let Some(_guard) = PassGuard::acquire(&self.running) else {
            tracing::debug!("sync pass already running, dropping request");
            return Ok(None);
        };
        self.pass().map(Some)
    }

    fn pass(&self) -> Result<PassReport, SyncError> {
        let verbose = self.settings.verbose;
        let series = &self.settings.series;
        let granularity = self.settings.granularity;
        let expected = granularity.expected_rows();
        let now = self.clock.now();

        progress!(
            verbose,
            source = self.fetcher.source_name(),
            "syncData run... {}",
            now.format(TIME_FORMAT)
        );

        self.store.ensure_dir()?;

        let buckets = generate_buckets(
            self.settings.start_instant(),
            granularity.bucket_width(),
            now,
        );
        let mut report = PassReport {
            now: Some(now),
            buckets: buckets.len(),
            ..Default::default()
        };

        for bucket in &buckets {
            let state = completeness::check(&self.store, bucket, expected, now)?;
            if !state.needs_fetch() {
                report.skipped += 1;
                continue;
            }

            progress!(
                verbose,
                "get {} {} {} downloading...",
                series.name,
                series.kind,
                bucket
            );
            let outcome = self
                .fetcher
                .fetch(&series.symbol, bucket.start, bucket.end, granularity);
            report.fetched += 1;
            progress!(verbose, "get {} {} {} finish", series.name, series.kind, bucket);

            if outcome.is_empty() {
                if outcome.is_success() {
                    report.empty += 1;
                } else {
                    report.failed += 1;
                }
                continue;
            }

            self.store.write(&bucket.tag, &outcome.rows)?;
            report.written += 1;
        }

        Ok(report)
    }

    /// One timer tick: run a pass and swallow its errors.
    fn tick(&self) {
        match self.run_pass() {
            Ok(Some(report)) => progress!(
                self.settings.verbose,
                buckets = report.buckets,
                written = report.written,
                failed = report.failed,
                "syncData finish"
            ),
            Ok(None) => {}
            Err(e) => tracing::error!(error = %e, "sync pass aborted"),
        }
    }

    fn status(&self) -> Result<Vec<BucketStatus>, SyncError> {
        let now = self.clock.now();
        let expected = self.settings.granularity.expected_rows();
        generate_buckets(
            self.settings.start_instant(),
            self.settings.granularity.bucket_width(),
            now,
        )
        .into_iter()
        .map(|bucket| {
            let state = completeness::check(&self.store, &bucket, expected, now)?;
            let rows = self.store.row_count(&bucket.tag)?;
            Ok(BucketStatus {
                bucket,
                state,
                rows,
            })
        })
        .collect()
    }
}

const MIN_SYNC_PERIOD: Duration = Duration::from_millis(1);

struct Worker {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

fn worker_loop(inner: Arc<Inner>, stop_rx: Receiver<()>) {
    // A zero period would never advance `next_tick`.
    let period = inner.settings.sync_interval.max(MIN_SYNC_PERIOD);
    let mut next_tick = Instant::now();

    loop {
        inner.tick();

        // Ticks that fell due during the pass are dropped.
        let now = Instant::now();
        next_tick += period;
        while next_tick <= now {
            next_tick += period;
        }

        match stop_rx.recv_timeout(next_tick - now) {
            Err(RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    tracing::debug!("sync worker stopped");
}

/// Periodic sync of one series.
pub struct SyncTask {
    inner: Arc<Inner>,
    worker: Mutex<Option<Worker>>,
}

impl SyncTask {
    /// Build a task against the configured REST endpoint and the wall clock.
    pub fn new(settings: SyncSettings) -> Result<Self, SyncError> {
        let source = BinanceSource::new(
            settings.series.endpoint.clone(),
            settings.proxy.as_ref(),
            settings.request_timeout,
        )?;
        Ok(Self::with_source(
            settings,
            Arc::new(source),
            Arc::new(SystemClock),
        ))
    }

    pub fn with_source(
        settings: SyncSettings,
        source: Arc<dyn KlineSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let fetcher = Fetcher::new(source, clock.clone()).with_delay(settings.request_delay);
        let store = settings.store();
        Self {
            inner: Arc::new(Inner {
                settings,
                store,
                fetcher,
                clock,
                running: AtomicBool::new(false),
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.inner.settings
    }

    pub fn store(&self) -> &BucketStore {
        &self.inner.store
    }

    /// True while a pass is in flight.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Run one pass now. Returns `None` if another pass is already in flight.
    pub fn run_pass(&self) -> Result<Option<PassReport>, SyncError> {
        self.inner.run_pass()
    }

    /// Classify every bucket without fetching anything.
    pub fn status(&self) -> Result<Vec<BucketStatus>, SyncError> {
        self.inner.status()
    }

    /// Start periodic syncing: one pass immediately, then one per interval.
    pub fn run(&self) -> Result<(), SyncError> {
        let mut worker = self.worker.lock().unwrap();
        if worker.as_ref().is_some_and(|w| w.stop_tx.is_some()) {
            return Err(SyncError::AlreadyStarted);
        }

        let (stop_tx, stop_rx) = mpsc::channel();
        let inner = Arc::clone(&self.inner);
        let handle = thread::Builder::new()
            .name("klinesync-worker".into())
            .spawn(move || worker_loop(inner, stop_rx))
            .map_err(SyncError::Spawn)?;

        *worker = Some(Worker {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        });
        Ok(())
    }

    /// Cancel future passes. An in-flight pass runs to completion.
    pub fn stop(&self) {
        if let Some(worker) = self.worker.lock().unwrap().as_mut() {
            if let Some(tx) = worker.stop_tx.take() {
                let _ = tx.send(());
            }
        }
    }

    /// Block until the worker thread exits. Returns immediately if never started.
    pub fn wait(&self) {
        let handle = self
            .worker
            .lock()
            .unwrap()
            .as_mut()
            .and_then(|w| w.handle.take());
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!("sync worker panicked");
            }
        }
    }
}

impl Drop for SyncTask {
    fn drop(&mut self) {
        self.stop();
    }
}
