//! Normalized kline rows and their line-oriented text forms.

use super::provider::{FetchError, RawKline};
use crate::window::TIME_FORMAT;
use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Field separator inside one CSV line.
pub const FIELD_SEPARATOR: &str = ", ";

/// One normalized sample. Numeric columns keep the upstream's exact text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub open_time: NaiveDateTime,
    pub open: String,
    pub high: String,
    pub low: String,
    pub close: String,
    pub volume: String,
    /// Clamped to the fetch instant when upstream reports a future close.
    pub close_time: NaiveDateTime,
    pub quote_volume: String,
    pub trade_count: String,
    pub taker_buy_base_volume: String,
    pub taker_buy_quote_volume: String,
}

fn from_millis(millis: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp(millis.div_euclid(1000), 0).map(|dt| dt.naive_utc())
}

impl Row {
    /// Normalize a raw candle. Only the close time is clamped to `now`.
    pub fn from_raw(raw: &RawKline, now: NaiveDateTime) -> Result<Self, FetchError> {
        let open_time = raw
            .millis(0)
            .and_then(from_millis)
            .ok_or_else(|| FetchError::ResponseFormatChanged("missing open time".into()))?;
        let close_time = raw
            .millis(6)
            .and_then(from_millis)
            .ok_or_else(|| FetchError::ResponseFormatChanged("missing close time".into()))?;

        Ok(Self {
            open_time,
            open: raw.text(1),
            high: raw.text(2),
            low: raw.text(3),
            close: raw.text(4),
            volume: raw.text(5),
            close_time: close_time.min(now),
            quote_volume: raw.text(7),
            trade_count: raw.text(8),
            taker_buy_base_volume: raw.text(9),
            taker_buy_quote_volume: raw.text(10),
        })
    }

    /// Fields in file order.
    pub fn fields(&self) -> [String; 11] {
        [
            self.open_time.format(TIME_FORMAT).to_string(),
            self.open.clone(),
            self.high.clone(),
            self.low.clone(),
            self.close.clone(),
            self.volume.clone(),
            self.close_time.format(TIME_FORMAT).to_string(),
            self.quote_volume.clone(),
            self.trade_count.clone(),
            self.taker_buy_base_volume.clone(),
            self.taker_buy_quote_volume.clone(),
        ]
    }

    pub fn to_csv_line(&self) -> String {
        self.fields().join(FIELD_SEPARATOR)
    }

    pub fn to_json_line(&self) -> String {
        serde_json::Value::from(self.fields().to_vec()).to_string()
    }
}

/// How rows are serialized into a bucket file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowFormat {
    /// `", "`-joined fields, one row per line.
    Csv,
    /// One JSON array of strings per line.
    JsonLines,
}

impl RowFormat {
    pub fn from_csv_toggle(convert_to_csv: bool) -> Self {
        if convert_to_csv {
            Self::Csv
        } else {
            Self::JsonLines
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::JsonLines => "jsonl",
        }
    }

    /// Render rows; lines are joined by `\n` with no trailing newline.
    pub fn render(self, rows: &[Row]) -> String {
        let lines: Vec<String> = match self {
            Self::Csv => rows.iter().map(Row::to_csv_line).collect(),
            Self::JsonLines => rows.iter().map(Row::to_json_line).collect(),
        };
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn raw() -> RawKline {
        serde_json::from_value(json!([
            1577836800000i64,
            "7195.24",
            "7196.25",
            "7183.14",
            "7186.68",
            "51.642812",
            1577836859999i64,
            "371233.64",
            493,
            "19.249528",
            "138378.98",
            "0"
        ]))
        .unwrap()
    }

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, 1, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn csv_line_matches_file_layout() {
        let row = Row::from_raw(&raw(), at(12, 0, 0)).unwrap();
        assert_eq!(
            row.to_csv_line(),
            "2020-01-01T00:00:00, 7195.24, 7196.25, 7183.14, 7186.68, 51.642812, \
             2020-01-01T00:00:59, 371233.64, 493, 19.249528, 138378.98"
        );
    }

    #[test]
    fn future_close_time_is_clamped_but_open_time_is_not() {
        let now = at(0, 0, 30);
        let row = Row::from_raw(&raw(), now).unwrap();
        assert_eq!(row.close_time, now);
        assert_eq!(row.open_time, at(0, 0, 0));
    }

    #[test]
    fn index_candles_leave_volume_columns_empty() {
        let raw: RawKline = serde_json::from_value(json!([
            1577836800000i64,
            "0.0001",
            "0.0002",
            "0.0000",
            "0.0001",
            "0",
            1577836859999i64
        ]))
        .unwrap();
        let row = Row::from_raw(&raw, at(12, 0, 0)).unwrap();
        assert_eq!(row.quote_volume, "");
        assert!(row.to_csv_line().ends_with("2020-01-01T00:00:59, , , , "));
    }

    #[test]
    fn missing_timestamps_are_format_errors() {
        let raw: RawKline = serde_json::from_value(json!(["x", "1"])).unwrap();
        assert!(matches!(
            Row::from_raw(&raw, at(0, 0, 0)),
            Err(FetchError::ResponseFormatChanged(_))
        ));
    }

    #[test]
    fn render_has_no_trailing_newline() {
        let row = Row::from_raw(&raw(), at(12, 0, 0)).unwrap();
        let text = RowFormat::Csv.render(&[row.clone(), row.clone()]);
        assert_eq!(text.lines().count(), 2);
        assert!(!text.ends_with('\n'));

        let json = RowFormat::JsonLines.render(&[row]);
        let parsed: Vec<String> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), 11);
        assert_eq!(parsed[0], "2020-01-01T00:00:00");
    }
}
