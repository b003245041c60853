//! CSV price feed — offline fallback when no upstream is reachable.
//!
//! Expected header: `timestamp,open,high,low,close,volume`, where
//! `timestamp` is either `YYYY-MM-DD` or `YYYY-MM-DD HH:MM:SS`. Rows are
//! assumed to be at the timeframe's source width; coarser timeframes are
//! resampled exactly like the network feeds.

use chrono::NaiveDate;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use super::provider::{DataError, DataSource, FetchResult, PriceFeed};
use super::resample::resample;
use crate::domain::{BarKey, BarKind, PriceBar, PriceSeries};
use crate::timeframe::Timeframe;

const PROVIDER: &str = "csv";

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(alias = "date", alias = "datetime")]
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
}

/// Parse OHLCV rows into a series of `kind`.
///
/// Rows whose timestamp cannot be parsed or whose values are invalid are
/// dropped with a warning. Intraday stamps in a daily series collapse to
/// their date (last row wins).
pub fn read_series<R: Read>(reader: R, kind: BarKind) -> Result<PriceSeries, DataError> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut series = PriceSeries::new(kind);
    let mut skipped = 0usize;

    for row in rdr.deserialize() {
        let row: CsvRow = row?;
        let Some(key) = BarKey::parse(&row.timestamp) else {
            skipped += 1;
            continue;
        };
        let bar = PriceBar {
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        };
        if !bar.is_valid() {
            skipped += 1;
            continue;
        }
        if key.kind() == BarKind::Daily && kind == BarKind::Intraday {
            return Err(DataError::UnexpectedUpstreamShape {
                provider: PROVIDER.into(),
                message: format!("daily row '{key}' in an intraday file"),
            });
        }
        series.insert(BarKey::for_kind(key.timestamp(), kind), bar);
    }

    if skipped > 0 {
        tracing::warn!(skipped, "dropped unreadable CSV rows");
    }
    Ok(series)
}

/// Price feed backed by one CSV file per symbol in a directory, or a single
/// file used for every symbol.
#[derive(Debug, Clone)]
pub struct CsvPriceFeed {
    location: PathBuf,
}

impl CsvPriceFeed {
    /// `location` may be a file, or a directory holding `<SYMBOL>.csv` files.
    pub fn new(location: impl Into<PathBuf>) -> Self {
        Self {
            location: location.into(),
        }
    }

    fn path_for(&self, symbol: &str) -> PathBuf {
        if self.location.is_dir() {
            self.location.join(format!("{}.csv", symbol.to_uppercase()))
        } else {
            self.location.clone()
        }
    }

    pub fn location(&self) -> &Path {
        &self.location
    }
}

impl PriceFeed for CsvPriceFeed {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn fetch(
        &self,
        symbol: &str,
        timeframe: &Timeframe,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<FetchResult, DataError> {
        let path = self.path_for(symbol);
        tracing::debug!(symbol, path = %path.display(), "reading CSV prices");
        let file = File::open(&path)?;
        let mut series = read_series(BufReader::new(file), timeframe.kind)?;

        if series.is_empty() {
            return Err(DataError::NoDataForSymbol {
                symbol: symbol.to_string(),
                start,
                end,
            });
        }
        if timeframe.needs_resample {
            series = resample(&series, timeframe.minutes, timeframe.source_minutes)?;
        }

        Ok(FetchResult {
            symbol: symbol.to_uppercase(),
            series,
            source: DataSource::CsvImport,
            requests: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const DAILY: &str = "timestamp,open,high,low,close,volume\n\
        2024-01-02,100,102,99,101,1000\n\
        2024-01-03,101,103,100,102,1100\n\
        not-a-date,1,1,1,1,1\n";

    #[test]
    fn reads_daily_rows_and_skips_garbage() {
        let s = read_series(DAILY.as_bytes(), BarKind::Daily).unwrap();
        assert_eq!(s.len(), 2);
        assert_eq!(s.last_key().unwrap().as_str(), "2024-01-03");
    }

    #[test]
    fn date_column_alias_is_accepted() {
        let data = "date,open,high,low,close,volume\n2024-01-02,1,2,0.5,1.5,10\n";
        let s = read_series(data.as_bytes(), BarKind::Daily).unwrap();
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn daily_rows_cannot_feed_intraday_series() {
        let err = read_series(DAILY.as_bytes(), BarKind::Intraday).unwrap_err();
        assert!(matches!(err, DataError::UnexpectedUpstreamShape { .. }));
    }

    #[test]
    fn feed_resolves_symbol_files_in_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut f = File::create(dir.path().join("SPY.csv")).unwrap();
        f.write_all(DAILY.as_bytes()).unwrap();

        let feed = CsvPriceFeed::new(dir.path());
        let tf = Timeframe::parse("1d").unwrap();
        let d = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let r = feed.fetch("spy", &tf, d, d).unwrap();
        assert_eq!(r.source, DataSource::CsvImport);
        assert_eq!(r.series.len(), 2);

        assert!(matches!(
            feed.fetch("QQQ", &tf, d, d),
            Err(DataError::Io(_))
        ));
    }
}
