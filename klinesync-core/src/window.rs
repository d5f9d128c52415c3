//! Window generator: fixed-width buckets from a start instant up to "now".
//!
//! Boundaries run `start, start + w, start + 2w, ...` and stop at the first
//! boundary strictly after `now`. Consecutive boundaries form one bucket, so
//! the last bucket always contains `now` and is still filling.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Display format for instants in logs and bucket files.
pub const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Format of a bucket tag (file stem).
pub const TAG_FORMAT: &str = "%Y%m%d%H%M%S";

/// One bucket: `[start, next)` exposed as the inclusive range `[start, end]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    pub tag: String,
    pub start: NaiveDateTime,
    /// Last second inside the bucket (`next - 1s`).
    pub end: NaiveDateTime,
    /// First instant of the following bucket.
    pub next: NaiveDateTime,
}

impl Bucket {
    pub fn new(start: NaiveDateTime, next: NaiveDateTime) -> Self {
        Self {
            tag: tag_for(start),
            start,
            end: next - Duration::seconds(1),
            next,
        }
    }

    /// True if `now` falls inside this bucket.
    pub fn contains(&self, now: NaiveDateTime) -> bool {
        self.start <= now && now < self.next
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] -> [{}]",
            self.start.format(TIME_FORMAT),
            self.end.format(TIME_FORMAT)
        )
    }
}

pub fn tag_for(start: NaiveDateTime) -> String {
    start.format(TAG_FORMAT).to_string()
}

/// Generate the ordered, gapless bucket sequence covering `[start, now]`.
///
/// Returns an empty vector when `start > now` or `width` is not positive.
pub fn generate_buckets(start: NaiveDateTime, width: Duration, now: NaiveDateTime) -> Vec<Bucket> {
    if width <= Duration::zero() || start > now {
        return Vec::new();
    }

    let mut buckets = Vec::new();
    let mut lo = start;
    loop {
        let hi = lo + width;
        buckets.push(Bucket::new(lo, hi));
        if hi > now {
            break;
        }
        lo = hi;
    }
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn two_day_buckets_around_now() {
        let buckets = generate_buckets(
            at(2020, 1, 1, 0, 0, 0),
            Duration::hours(48),
            at(2020, 1, 3, 5, 0, 0),
        );

        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].start, at(2020, 1, 1, 0, 0, 0));
        assert_eq!(buckets[0].end, at(2020, 1, 2, 23, 59, 59));
        assert_eq!(buckets[1].start, at(2020, 1, 3, 0, 0, 0));
        assert_eq!(buckets[1].end, at(2020, 1, 4, 23, 59, 59));
        assert_eq!(buckets[0].tag, "20200101000000");
        assert_eq!(buckets[1].tag, "20200103000000");
        assert!(buckets[1].contains(at(2020, 1, 3, 5, 0, 0)));
        assert!(!buckets[0].contains(at(2020, 1, 3, 5, 0, 0)));
    }

    #[test]
    fn now_on_boundary_opens_a_new_bucket() {
        let buckets = generate_buckets(
            at(2020, 1, 1, 0, 0, 0),
            Duration::hours(1),
            at(2020, 1, 1, 3, 0, 0),
        );
        assert_eq!(buckets.len(), 4);
        assert_eq!(buckets[3].start, at(2020, 1, 1, 3, 0, 0));
    }

    #[test]
    fn now_equal_to_start_yields_one_bucket() {
        let t = at(2021, 6, 1, 0, 0, 0);
        let buckets = generate_buckets(t, Duration::hours(1), t);
        assert_eq!(buckets.len(), 1);
        assert!(buckets[0].contains(t));
    }

    #[test]
    fn start_in_future_yields_nothing() {
        let buckets = generate_buckets(
            at(2030, 1, 1, 0, 0, 0),
            Duration::hours(1),
            at(2020, 1, 1, 0, 0, 0),
        );
        assert!(buckets.is_empty());
    }

    #[test]
    fn display_uses_log_format() {
        let b = Bucket::new(at(2025, 4, 18, 0, 0, 0), at(2025, 4, 20, 0, 0, 0));
        assert_eq!(b.to_string(), "[2025-04-18T00:00:00] -> [2025-04-19T23:59:59]");
    }
}
