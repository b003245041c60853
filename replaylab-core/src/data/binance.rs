//! Binance crypto price feed.
//!
//! Klines come back at most `limit` per request, so a date range is walked
//! page by page: each next page starts 1 ms after the previous page's last
//! open time. The walk stops on a short page, when the cursor passes the
//! range end, or when the candle spacing says the next candle would open past
//! the end (or in the future). It aborts with [`DataError::PaginationTimeout`] when either
//! the page cap or the wall-clock deadline is exceeded.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde_json::Value;
use std::time::{Duration, Instant};

use super::provider::{DataError, DataSource, FetchResult, PriceFeed};
use super::resample::resample;
use crate::domain::{crypto_base, BarKey, PriceBar, PriceSeries};
use crate::timeframe::Timeframe;

pub const DEFAULT_BASE_URL: &str = "https://api.binance.com";
const PROVIDER: &str = "binance";
const KLINES_PATH: &str = "/api/v3/klines";
/// Binance error code for an unknown trading pair.
const INVALID_SYMBOL_CODE: i64 = -1121;

/// Bounds on one paginated fetch.
#[derive(Debug, Clone, Copy)]
pub struct PageLimits {
    /// Candles requested per page (Binance caps this at 1000).
    pub page_size: usize,
    pub max_pages: usize,
    pub deadline: Duration,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            page_size: 1000,
            max_pages: 200,
            deadline: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BinanceConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub limits: PageLimits,
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
            limits: PageLimits::default(),
        }
    }
}

/// One candle, decoded from Binance's positional array encoding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Kline {
    pub open_time_ms: i64,
    pub bar: PriceBar,
}

/// Trading pair for a user symbol: `BTC`, `btc-usd`, `BTCUSD` all map to `BTCUSDT`.
pub fn binance_pair(symbol: &str) -> String {
    format!("{}USDT", crypto_base(symbol))
}

/// Walk `[start_ms, end_ms]` one page at a time.
///
/// `fetch_page(start_ms, end_ms, page_size)` issues one request. Returns the
/// concatenated candles and the number of pages fetched.
pub fn paginate_klines<F>(
    symbol: &str,
    start_ms: i64,
    end_ms: i64,
    limits: PageLimits,
    mut fetch_page: F,
) -> Result<(Vec<Kline>, usize), DataError>
where
    F: FnMut(i64, i64, usize) -> Result<Vec<Kline>, DataError>,
{
    let started = Instant::now();
    let mut cursor = start_ms;
    let mut pages = 0usize;
    let mut out: Vec<Kline> = Vec::new();

    while cursor <= end_ms {
        if pages >= limits.max_pages || started.elapsed() > limits.deadline {
            return Err(DataError::PaginationTimeout {
                symbol: symbol.to_string(),
                pages,
            });
        }

        let page = fetch_page(cursor, end_ms, limits.page_size)?;
        pages += 1;
        let Some(last) = page.last().copied() else {
            break;
        };
        let prev = match page.len() {
            1 => out.last().map(|k| k.open_time_ms),
            n => Some(page[n - 2].open_time_ms),
        };
        let next = last.open_time_ms + 1;
        let short = page.len() < limits.page_size;
        out.extend(page);

        if short || next <= cursor {
            break;
        }
        // No further candle can open inside the window
        if let Some(step) = prev.map(|p| last.open_time_ms - p).filter(|s| *s > 0) {
            if last.open_time_ms + step > end_ms {
                break;
            }
        }
        cursor = next;
    }

    tracing::debug!(symbol, pages, candles = out.len(), "binance pagination complete");
    Ok((out, pages))
}

/// Decode a klines response body.
pub fn parse_klines(body: &Value) -> Result<Vec<Kline>, DataError> {
    let rows = body.as_array().ok_or_else(|| shape("klines body is not an array"))?;
    rows.iter()
        .map(|row| {
            let cols = row.as_array().ok_or_else(|| shape("kline row is not an array"))?;
            if cols.len() < 6 {
                return Err(shape(&format!("kline row has {} columns", cols.len())));
            }
            let open_time_ms = cols[0]
                .as_i64()
                .ok_or_else(|| shape("kline open time is not an integer"))?;
            Ok(Kline {
                open_time_ms,
                bar: PriceBar {
                    open: number(&cols[1])?,
                    high: number(&cols[2])?,
                    low: number(&cols[3])?,
                    close: number(&cols[4])?,
                    volume: number(&cols[5])?,
                },
            })
        })
        .collect()
}

/// Classify a non-success HTTP response.
pub fn classify_http_error(symbol: &str, status: u16, body: &str) -> DataError {
    if status == 429 || status == 418 {
        return DataError::RateLimited {
            provider: PROVIDER.into(),
            message: format!("HTTP {status}"),
        };
    }
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let code = parsed.as_ref().and_then(|v| v.get("code")).and_then(Value::as_i64);
    let msg = parsed
        .as_ref()
        .and_then(|v| v.get("msg"))
        .and_then(Value::as_str)
        .unwrap_or(body)
        .to_string();
    if status == 400 && code == Some(INVALID_SYMBOL_CODE) {
        return DataError::InvalidSymbol {
            symbol: symbol.to_string(),
            message: msg,
        };
    }
    DataError::Upstream {
        provider: PROVIDER.into(),
        message: format!("HTTP {status}: {msg}"),
    }
}

fn number(v: &Value) -> Result<f64, DataError> {
    match v {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
    .ok_or_else(|| shape(&format!("kline value {v} is not numeric")))
}

fn shape(message: &str) -> DataError {
    DataError::UnexpectedUpstreamShape {
        provider: PROVIDER.into(),
        message: message.to_string(),
    }
}

pub struct BinanceFeed {
    client: reqwest::blocking::Client,
    config: BinanceConfig,
}

impl BinanceFeed {
    pub fn new(config: BinanceConfig) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DataError::Upstream {
                provider: PROVIDER.into(),
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client, config })
    }

    fn fetch_page(
        &self,
        pair: &str,
        symbol: &str,
        interval: &str,
        start_ms: i64,
        end_ms: i64,
        limit: usize,
    ) -> Result<Vec<Kline>, DataError> {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), KLINES_PATH);
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("symbol", pair.to_string()),
                ("interval", interval.to_string()),
                ("startTime", start_ms.to_string()),
                ("endTime", end_ms.to_string()),
                ("limit", limit.to_string()),
            ])
            .send()
            .map_err(|e| DataError::Upstream {
                provider: PROVIDER.into(),
                message: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(classify_http_error(symbol, status.as_u16(), &body));
        }
        let body: Value = resp.json().map_err(|e| shape(&format!("invalid JSON: {e}")))?;
        parse_klines(&body)
    }
}

impl PriceFeed for BinanceFeed {
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
        let pair = binance_pair(symbol);
        let interval = timeframe.intervals.crypto_interval.as_str();
        let start_ms = start.and_time(NaiveTime::MIN).and_utc().timestamp_millis();
        let end_ms = end
            .succ_opt()
            .unwrap_or(end)
            .and_time(NaiveTime::MIN)
            .and_utc()
            .timestamp_millis()
            - 1;
        let end_ms = end_ms.min(Utc::now().timestamp_millis());
        tracing::debug!(symbol, pair = %pair, interval, "requesting Binance klines");

        let (klines, pages) =
            paginate_klines(symbol, start_ms, end_ms, self.config.limits, |from, to, limit| {
                self.fetch_page(&pair, symbol, interval, from, to, limit)
            })?;

        if klines.is_empty() {
            return Err(DataError::NoDataForSymbol {
                symbol: symbol.to_string(),
                start,
                end,
            });
        }

        let mut series = klines_to_series(&klines, timeframe)?;
        if timeframe.needs_resample {
            series = resample(&series, timeframe.minutes, timeframe.source_minutes)?;
        }

        Ok(FetchResult {
            symbol: symbol.to_uppercase(),
            series,
            source: DataSource::Binance,
            requests: pages,
        })
    }
}

/// Key candles by open time in the timeframe's bar kind. Invalid bars are dropped.
pub fn klines_to_series(klines: &[Kline], timeframe: &Timeframe) -> Result<PriceSeries, DataError> {
    let mut series = PriceSeries::new(timeframe.kind);
    let mut skipped = 0usize;
    for k in klines {
        let at = DateTime::from_timestamp_millis(k.open_time_ms)
            .ok_or_else(|| shape(&format!("open time {} out of range", k.open_time_ms)))?
            .naive_utc();
        if k.bar.is_valid() {
            series.insert(BarKey::for_kind(at, timeframe.kind), k.bar);
        } else {
            skipped += 1;
        }
    }
    if skipped > 0 {
        tracing::warn!(skipped, "dropped invalid Binance candles");
    }
    Ok(series)
}
