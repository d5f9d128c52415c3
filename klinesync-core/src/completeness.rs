//! Completeness checker: decides whether a bucket must be (re-)fetched.
//!
//! The check is a line-count heuristic. A corrupted file with the right number
//! of lines passes.

use crate::data::store::{count_rows, BucketStore, StoreError};
use crate::window::Bucket;
use chrono::NaiveDateTime;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Completeness {
    /// No file on disk.
    Missing,
    /// Bucket overlaps "now" and is still filling. Always refetched.
    Current,
    /// File exists with the wrong row count.
    Incomplete { found: usize, expected: usize },
    Complete,
}

impl Completeness {
    pub fn needs_fetch(self) -> bool {
        !matches!(self, Self::Complete)
    }
}

/// Classify `bucket` against its file in `store`.
///
/// The current bucket wins over the row-count rule; its file is not read.
pub fn check(
    store: &BucketStore,
    bucket: &Bucket,
    expected: usize,
    now: NaiveDateTime,
) -> Result<Completeness, StoreError> {
    let path = store.path_for(&bucket.tag);
    if !path.is_file() {
        return Ok(Completeness::Missing);
    }

    if bucket.contains(now) {
        return Ok(Completeness::Current);
    }

    let found = count_rows(&path)?;
    if found != expected {
        tracing::warn!(path = %path.display(), "not complete: n[{found}]!=={expected}");
        return Ok(Completeness::Incomplete { found, expected });
    }

    Ok(Completeness::Complete)
}
