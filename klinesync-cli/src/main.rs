//! klinesync CLI: keep bucketed kline files in step with an upstream API.
//!
//! Commands:
//! - `sync`: one pass now, then one per `--sync-interval-ms`, until killed
//! - `once`: a single pass, then exit
//! - `fetch`: download one explicit range and print it to stdout
//! - `status`: report every bucket's completeness without fetching

use anyhow::{bail, Context, Result};
use chrono::NaiveDateTime;
use clap::{Args, Parser, Subcommand};
use klinesync_core::data::{BinanceSource, Fetcher};
use klinesync_core::window::TIME_FORMAT;
use klinesync_core::{
    Completeness, ProxyConfig, Series, SyncConfig, SyncOptions, SyncSettings, SyncTask,
    SystemClock,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "klinesync",
    about = "klinesync: incremental kline downloads into bucketed CSV files"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync periodically: one pass now, then one per interval.
    Sync {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Run a single sync pass and exit.
    Once {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Download one explicit range and print the rows to stdout.
    Fetch {
        #[command(flatten)]
        target: TargetArgs,

        /// Range start (YYYY-MM-DDTHH:MM:SS, UTC).
        #[arg(long)]
        from: String,

        /// Range end, inclusive (YYYY-MM-DDTHH:MM:SS, UTC).
        #[arg(long)]
        to: String,
    },
    /// Report each bucket's completeness without fetching.
    Status {
        #[command(flatten)]
        target: TargetArgs,

        /// Only list buckets that would be fetched.
        #[arg(long, default_value_t = false)]
        stale_only: bool,
    },
}

/// Series and options. Flags override values from `--config`.
#[derive(Args)]
struct TargetArgs {
    /// TOML file with `[series]` and optional `[options]` tables.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Series name, first folder level (e.g., BTC).
    #[arg(long)]
    name: Option<String>,

    /// Series type, second folder level (e.g., price, index).
    #[arg(long = "type")]
    kind: Option<String>,

    /// Upstream symbol (e.g., BTCUSDT).
    #[arg(long)]
    symbol: Option<String>,

    /// Kline endpoint. Defaults to the Binance spot klines API.
    #[arg(long)]
    endpoint: Option<String>,

    /// First day to sync (YYYY-MM-DD). Defaults to 2020-01-01.
    #[arg(long)]
    day_start: Option<String>,

    /// Sampling interval: 1m, 5m, 15m, 30m, 1h/1hr, 4h/4hr, 1d. Defaults to 1m.
    #[arg(long)]
    interval: Option<String>,

    /// Root data folder. Defaults to ./data.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Proxy host.
    #[arg(long)]
    proxy_host: Option<String>,

    /// Proxy port (required with --proxy-host).
    #[arg(long)]
    proxy_port: Option<u16>,

    /// Proxy protocol. Defaults to http.
    #[arg(long)]
    proxy_protocol: Option<String>,

    /// Write JSON lines instead of CSV.
    #[arg(long, default_value_t = false)]
    no_csv: bool,

    /// Period between passes in milliseconds. Defaults to 60000.
    #[arg(long)]
    sync_interval_ms: Option<u64>,

    /// Delay after every upstream request in milliseconds. Defaults to 100.
    #[arg(long)]
    request_delay_ms: Option<u64>,

    /// Log pass and bucket progress.
    #[arg(long, short, default_value_t = false)]
    verbose: bool,
}

impl TargetArgs {
    fn resolve(self) -> Result<SyncSettings> {
        let (series, mut options) = match &self.config {
            Some(path) => {
                let config = SyncConfig::from_file(path)?;
                (Some(config.series), config.options)
            }
            None => (None, SyncOptions::default()),
        };

        let series = match series {
            Some(mut s) => {
                if let Some(v) = self.name {
                    s.name = v;
                }
                if let Some(v) = self.kind {
                    s.kind = v;
                }
                if let Some(v) = self.symbol {
                    s.symbol = v;
                }
                if let Some(v) = self.endpoint {
                    s.endpoint = v;
                }
                s
            }
            None => Series::new(
                &self.name.context("--name is required without --config")?,
                &self.kind.context("--type is required without --config")?,
                self.endpoint
                    .as_deref()
                    .unwrap_or(klinesync_core::data::DEFAULT_ENDPOINT),
                &self.symbol.context("--symbol is required without --config")?,
            ),
        };

        if self.day_start.is_some() {
            options.day_start = self.day_start;
        }
        if self.interval.is_some() {
            options.interval = self.interval;
        }
        if self.data_dir.is_some() {
            options.data_dir = self.data_dir;
        }
        match (self.proxy_host, self.proxy_port) {
            (Some(host), Some(port)) => {
                options.proxy = Some(ProxyConfig {
                    protocol: self.proxy_protocol.unwrap_or_else(|| "http".into()),
                    host,
                    port,
                });
            }
            (Some(_), None) => bail!("--proxy-port is required with --proxy-host"),
            (None, Some(_)) => bail!("--proxy-host is required with --proxy-port"),
            (None, None) => {}
        }
        if self.no_csv {
            options.convert_to_csv = Some(false);
        }
        if self.sync_interval_ms.is_some() {
            options.sync_interval_ms = self.sync_interval_ms;
        }
        if self.request_delay_ms.is_some() {
            options.request_delay_ms = self.request_delay_ms;
        }
        if self.verbose {
            options.verbose = Some(true);
        }

        Ok(options.resolve(series)?)
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Sync { target } => run_sync(target.resolve()?),
        Commands::Once { target } => run_once(target.resolve()?),
        Commands::Fetch { target, from, to } => run_fetch(target.resolve()?, &from, &to),
        Commands::Status { target, stale_only } => run_status(target.resolve()?, stale_only),
    }
}

fn run_sync(settings: SyncSettings) -> Result<()> {
    tracing::info!(
        name = %settings.series.name,
        kind = %settings.series.kind,
        symbol = %settings.series.symbol,
        interval = %settings.granularity,
        every_ms = settings.sync_interval.as_millis() as u64,
        "starting periodic sync"
    );
    let task = SyncTask::new(settings)?;
    task.run()?;
    task.wait();
    Ok(())
}

fn run_once(settings: SyncSettings) -> Result<()> {
    let task = SyncTask::new(settings)?;
    let Some(report) = task.run_pass()? else {
        bail!("a sync pass is already running");
    };

    println!("Store: {}", task.store().dir().display());
    println!(
        "Buckets: {}  skipped: {}  fetched: {}  written: {}  empty: {}  failed: {}",
        report.buckets,
        report.skipped,
        report.fetched,
        report.written,
        report.empty,
        report.failed
    );

    if report.failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn parse_instant(value: &str, flag: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, TIME_FORMAT)
        .with_context(|| format!("{flag} must look like 2020-01-01T00:00:00, got '{value}'"))
}

fn run_fetch(settings: SyncSettings, from: &str, to: &str) -> Result<()> {
    let start = parse_instant(from, "--from")?;
    let end = parse_instant(to, "--to")?;
    if end < start {
        bail!("--to must not be before --from");
    }

    let source = BinanceSource::new(
        settings.series.endpoint.clone(),
        settings.proxy.as_ref(),
        settings.request_timeout,
    )?;
    let fetcher = Fetcher::new(Arc::new(source), Arc::new(SystemClock))
        .with_delay(settings.request_delay);

    let outcome = fetcher.fetch(&settings.series.symbol, start, end, settings.granularity);
    if let Some(err) = outcome.error {
        bail!("fetch failed: {err}");
    }
    if outcome.rows.is_empty() {
        bail!("no k-data returned for symbol[{}]", settings.series.symbol);
    }

    println!("{}", settings.row_format.render(&outcome.rows));
    Ok(())
}

fn run_status(settings: SyncSettings, stale_only: bool) -> Result<()> {
    let task = SyncTask::new(settings)?;
    let expected = task.settings().granularity.expected_rows();

    let dir = task.store().dir().to_path_buf();
    if !dir.exists() {
        println!("Store does not exist yet: {}", dir.display());
    }

    let statuses = task.status()?;
    let stale = statuses.iter().filter(|s| s.state.needs_fetch()).count();

    println!("Store: {}", dir.display());
    println!(
        "Buckets: {}  complete: {}  stale: {}  (expected {} rows per bucket)",
        statuses.len(),
        statuses.len() - stale,
        stale,
        expected
    );
    println!();
    println!("{:<16} {:<45} {:<12} {:>6}", "Tag", "Range", "State", "Rows");
    println!("{}", "-".repeat(82));

    for status in &statuses {
        if stale_only && !status.state.needs_fetch() {
            continue;
        }
        let state = match status.state {
            Completeness::Missing => "missing",
            Completeness::Current => "current",
            Completeness::Incomplete { .. } => "incomplete",
            Completeness::Complete => "complete",
        };
        let rows = status
            .rows
            .map(|n| n.to_string())
            .unwrap_or_else(|| "-".into());
        println!(
            "{:<16} {:<45} {:<12} {:>6}",
            status.bucket.tag,
            status.bucket.to_string(),
            state,
            rows
        );
    }

    Ok(())
}
