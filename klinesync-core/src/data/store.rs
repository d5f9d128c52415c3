//! Bucket file store.
//!
//! Layout: `{root}/{name}/{type}/{interval}/{tag}.csv`
//!
//! Files are overwritten in place (no temp-file rename). A crash mid-write
//! leaves a short file, which the completeness check picks up on the next
//! pass.

use super::row::{Row, RowFormat};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("refusing to overwrite bucket {tag} with no rows")]
    EmptyWrite { tag: String },
}

impl StoreError {
    fn io(op: &'static str, path: &Path, source: io::Error) -> Self {
        Self::Io {
            op,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// One series' folder of bucket files.
#[derive(Debug, Clone)]
pub struct BucketStore {
    dir: PathBuf,
    format: RowFormat,
}

impl BucketStore {
    pub fn new(
        root: impl AsRef<Path>,
        name: &str,
        kind: &str,
        interval: &str,
        format: RowFormat,
    ) -> Self {
        Self {
            dir: root.as_ref().join(name).join(kind).join(interval),
            format,
        }
    }

    /// Directory holding every bucket file of this series.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn format(&self) -> RowFormat {
        self.format
    }

    pub fn path_for(&self, tag: &str) -> PathBuf {
        self.dir.join(format!("{tag}.{}", self.format.extension()))
    }

    pub fn ensure_dir(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).map_err(|e| StoreError::io("create dir", &self.dir, e))
    }

    /// Overwrite the bucket file for `tag`.
    pub fn write(&self, tag: &str, rows: &[Row]) -> Result<PathBuf, StoreError> {
        if rows.is_empty() {
            return Err(StoreError::EmptyWrite {
                tag: tag.to_string(),
            });
        }
        self.ensure_dir()?;
        let path = self.path_for(tag);
        fs::write(&path, self.format.render(rows)).map_err(|e| StoreError::io("write", &path, e))?;
        Ok(path)
    }

    /// Row count of the bucket file for `tag`, or `None` when it does not exist.
    pub fn row_count(&self, tag: &str) -> Result<Option<usize>, StoreError> {
        let path = self.path_for(tag);
        if !path.is_file() {
            return Ok(None);
        }
        count_rows(&path).map(Some)
    }
}

/// Count non-empty lines in a bucket file.
///
/// Invalid UTF-8 is decoded lossily: a damaged file is counted like any other
/// and only real I/O failures are errors.
pub fn count_rows(path: &Path) -> Result<usize, StoreError> {
    let bytes = fs::read(path).map_err(|e| StoreError::io("read", path, e))?;
    Ok(String::from_utf8_lossy(&bytes)
        .lines()
        .filter(|l| !l.trim().is_empty())
        .count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn rows(n: usize) -> Vec<Row> {
        let t0 = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        (0..n)
            .map(|i| {
                let open_time = t0 + chrono::Duration::minutes(i as i64);
                Row {
                    open_time,
                    open: "100.0".into(),
                    high: "102.0".into(),
                    low: "99.0".into(),
                    close: "101.0".into(),
                    volume: "1000".into(),
                    close_time: open_time + chrono::Duration::seconds(59),
                    quote_volume: "101000".into(),
                    trade_count: "12".into(),
                    taker_buy_base_volume: "500".into(),
                    taker_buy_quote_volume: "50500".into(),
                }
            })
            .collect()
    }

    #[test]
    fn path_follows_series_layout() {
        let store = BucketStore::new("./data", "BTC", "price", "1m", RowFormat::Csv);
        assert_eq!(
            store.path_for("20240102000000"),
            PathBuf::from("./data/BTC/price/1m/20240102000000.csv")
        );

        let jsonl = BucketStore::new("./data", "BTC", "price", "1m", RowFormat::JsonLines);
        assert!(jsonl.path_for("x").to_string_lossy().ends_with("x.jsonl"));
    }

    #[test]
    fn write_then_count_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = BucketStore::new(dir.path(), "BTC", "price", "1m", RowFormat::Csv);

        assert_eq!(store.row_count("20240102000000").unwrap(), None);

        let path = store.write("20240102000000", &rows(60)).unwrap();
        assert!(path.is_file());
        assert_eq!(store.row_count("20240102000000").unwrap(), Some(60));
    }

    #[test]
    fn write_overwrites_instead_of_appending() {
        let dir = tempfile::tempdir().unwrap();
        let store = BucketStore::new(dir.path(), "BTC", "price", "1m", RowFormat::JsonLines);

        store.write("t", &rows(10)).unwrap();
        store.write("t", &rows(3)).unwrap();
        assert_eq!(store.row_count("t").unwrap(), Some(3));
    }

    #[test]
    fn empty_write_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let store = BucketStore::new(dir.path(), "BTC", "price", "1m", RowFormat::Csv);
        assert!(matches!(
            store.write("t", &[]),
            Err(StoreError::EmptyWrite { .. })
        ));
        assert!(!store.path_for("t").exists());
    }

    #[test]
    fn blank_lines_do_not_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.csv");
        fs::write(&path, "a, b\n\nc, d\n").unwrap();
        assert_eq!(count_rows(&path).unwrap(), 2);
    }

    #[test]
    fn invalid_utf8_is_counted_not_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = BucketStore::new(dir.path(), "BTC", "price", "1m", RowFormat::Csv);
        let path = store.write("t", &rows(60)).unwrap();

        let mut bytes = fs::read(&path).unwrap();
        bytes[0] = 0xFF;
        fs::write(&path, bytes).unwrap();

        assert_eq!(store.row_count("t").unwrap(), Some(60));
    }

    #[test]
    fn unreadable_path_is_still_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            count_rows(dir.path()),
            Err(StoreError::Io { op: "read", .. })
        ));
    }
}
