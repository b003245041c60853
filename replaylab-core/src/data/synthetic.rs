//! Deterministic synthetic price feed for demos and tests.
//!
//! A random walk seeded from the symbol name, so the same symbol always
//! produces the same bars. Clearly fake and tagged [`DataSource::Synthetic`].

use chrono::{Datelike, Duration, NaiveDate, NaiveTime};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::provider::{DataError, DataSource, FetchResult, PriceFeed};
use crate::domain::{BarKey, BarKind, PriceBar, PriceSeries};
use crate::timeframe::Timeframe;

#[derive(Debug, Clone)]
pub struct SyntheticFeed {
    start_price: f64,
    /// Per-bar return range, as a fraction.
    max_move: f64,
}

impl Default for SyntheticFeed {
    fn default() -> Self {
        Self {
            start_price: 100.0,
            max_move: 0.03,
        }
    }
}

impl SyntheticFeed {
    pub fn new(start_price: f64, max_move: f64) -> Self {
        Self {
            start_price,
            max_move,
        }
    }

    /// Generate bars at the timeframe's own width over `[start, end]`.
    /// Weekends are skipped for daily bars.
    pub fn generate(
        &self,
        symbol: &str,
        timeframe: &Timeframe,
        start: NaiveDate,
        end: NaiveDate,
    ) -> PriceSeries {
        let seed: [u8; 32] = *blake3::hash(symbol.to_uppercase().as_bytes()).as_bytes();
        let mut rng = StdRng::from_seed(seed);

        let step = Duration::minutes(i64::from(timeframe.minutes));
        let stop = end
            .succ_opt()
            .unwrap_or(end)
            .and_time(NaiveTime::MIN);
        let mut at = start.and_time(NaiveTime::MIN);
        let mut price = self.start_price;
        let mut series = PriceSeries::new(timeframe.kind);

        while at < stop {
            let weekday = at.weekday();
            if timeframe.kind == BarKind::Daily
                && (weekday == chrono::Weekday::Sat || weekday == chrono::Weekday::Sun)
            {
                at += step;
                continue;
            }

            let ret: f64 = rng.gen_range(-self.max_move..self.max_move);
            let open = price;
            let close = price * (1.0 + ret);
            let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.01));
            let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.01));
            let volume = rng.gen_range(500_000.0..5_000_000.0);

            series.insert(
                BarKey::for_kind(at, timeframe.kind),
                PriceBar {
                    open,
                    high,
                    low,
                    close,
                    volume,
                },
            );
            price = close;
            at += step;
        }
        series
    }
}

impl PriceFeed for SyntheticFeed {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch(
        &self,
        symbol: &str,
        timeframe: &Timeframe,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<FetchResult, DataError> {
        let series = self.generate(symbol, timeframe, start, end);
        if series.is_empty() {
            return Err(DataError::NoDataForSymbol {
                symbol: symbol.to_string(),
                start,
                end,
            });
        }
        Ok(FetchResult {
            symbol: symbol.to_uppercase(),
            series,
            source: DataSource::Synthetic,
            requests: 0,
        })
    }
}
