//! Alpha Vantage equity price feed.
//!
//! One request per symbol/timeframe against the `TIME_SERIES_DAILY` or
//! `TIME_SERIES_INTRADAY` function. Alpha Vantage answers almost everything
//! with HTTP 200, so error classification happens on the JSON body:
//! `Error Message` means the symbol was rejected, `Note`/`Information` means
//! the key hit its rate limit. The two are never conflated.
//!
//! Intraday stamps are exchange-local wall time (the `Time Zone` entry of
//! `Meta Data`, normally `US/Eastern`). They are converted to UTC before
//! keying so they line up with UTC snapshot timestamps.

use chrono::{Duration as ChronoDuration, NaiveDate, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;

use super::provider::{DataError, DataSource, FetchResult, PriceFeed};
use super::resample::resample;
use crate::domain::{BarKey, BarKind, PriceBar, PriceSeries};
use crate::timeframe::Timeframe;

pub const DEFAULT_BASE_URL: &str = "https://www.alphavantage.co/query";
const PROVIDER: &str = "alpha_vantage";

/// Zone assumed for intraday stamps when `Meta Data` does not name one.
pub const DEFAULT_EXCHANGE_TZ: Tz = chrono_tz::US::Eastern;

/// Connection settings. The API key is always supplied by the caller.
#[derive(Debug, Clone)]
pub struct AlphaVantageConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl AlphaVantageConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// One bar as Alpha Vantage encodes it (all numbers as strings).
#[derive(Debug, Deserialize)]
struct AvBar {
    #[serde(rename = "1. open")]
    open: String,
    #[serde(rename = "2. high")]
    high: String,
    #[serde(rename = "3. low")]
    low: String,
    #[serde(rename = "4. close")]
    close: String,
    #[serde(rename = "5. volume")]
    volume: String,
}

pub struct AlphaVantageFeed {
    client: reqwest::blocking::Client,
    config: AlphaVantageConfig,
}

impl AlphaVantageFeed {
    pub fn new(config: AlphaVantageConfig) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DataError::Upstream {
                provider: PROVIDER.into(),
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { client, config })
    }

    fn query_params(&self, symbol: &str, timeframe: &Timeframe) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("function", timeframe.intervals.equity_function.clone()),
            ("symbol", symbol.to_uppercase()),
            ("outputsize", "full".to_string()),
            ("datatype", "json".to_string()),
            ("apikey", self.config.api_key.clone()),
        ];
        if let Some(interval) = &timeframe.intervals.equity_interval {
            params.push(("interval", interval.clone()));
        }
        params
    }

    /// Name of the object holding the bars for this timeframe.
    fn series_key(timeframe: &Timeframe) -> String {
        match &timeframe.intervals.equity_interval {
            Some(interval) => format!("Time Series ({interval})"),
            None => "Time Series (Daily)".to_string(),
        }
    }

    /// Parse an Alpha Vantage response body into a raw (un-resampled) series.
    pub fn parse_response(
        symbol: &str,
        timeframe: &Timeframe,
        body: &Value,
    ) -> Result<PriceSeries, DataError> {
        let obj = body.as_object().ok_or_else(|| DataError::UnexpectedUpstreamShape {
            provider: PROVIDER.into(),
            message: "response body is not a JSON object".into(),
        })?;

        if let Some(msg) = obj.get("Error Message") {
            return Err(DataError::InvalidSymbol {
                symbol: symbol.to_string(),
                message: text_of(msg),
            });
        }
        for key in ["Note", "Information"] {
            if let Some(msg) = obj.get(key) {
                return Err(DataError::RateLimited {
                    provider: PROVIDER.into(),
                    message: text_of(msg),
                });
            }
        }

        let series_key = Self::series_key(timeframe);
        let raw = obj
            .get(&series_key)
            .ok_or_else(|| DataError::UnexpectedUpstreamShape {
                provider: PROVIDER.into(),
                message: format!("missing '{series_key}'; keys: {}", keys_of(obj)),
            })?;
        let raw: BTreeMap<String, AvBar> =
            serde_json::from_value(raw.clone()).map_err(|e| DataError::UnexpectedUpstreamShape {
                provider: PROVIDER.into(),
                message: format!("malformed '{series_key}': {e}"),
            })?;

        let zone = exchange_zone(obj)?;
        let mut series = PriceSeries::new(timeframe.kind);
        let mut skipped = 0usize;
        for (stamp, av) in raw {
            let parsed = BarKey::parse(&stamp).ok_or_else(|| DataError::UnexpectedUpstreamShape {
                provider: PROVIDER.into(),
                message: format!("unparseable timestamp '{stamp}'"),
            })?;
            let key = match timeframe.kind {
                BarKind::Daily => BarKey::daily(parsed.date()),
                BarKind::Intraday => BarKey::intraday(local_to_utc(parsed.timestamp(), zone)),
            };
            match av.to_bar() {
                Some(bar) if bar.is_valid() => {
                    series.insert(key, bar);
                }
                _ => skipped += 1,
            }
        }
        if skipped > 0 {
            tracing::warn!(symbol, skipped, "dropped malformed Alpha Vantage bars");
        }
        Ok(series)
    }
}

impl AvBar {
    fn to_bar(&self) -> Option<PriceBar> {
        Some(PriceBar {
            open: self.open.trim().parse().ok()?,
            high: self.high.trim().parse().ok()?,
            low: self.low.trim().parse().ok()?,
            close: self.close.trim().parse().ok()?,
            volume: self.volume.trim().parse().ok()?,
        })
    }
}

impl PriceFeed for AlphaVantageFeed {
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
        let params = self.query_params(symbol, timeframe);
        tracing::debug!(symbol, timeframe = %timeframe.label, "requesting Alpha Vantage series");

        let resp = self
            .client
            .get(&self.config.base_url)
            .query(&params)
            .send()
            .map_err(|e| DataError::Upstream {
                provider: PROVIDER.into(),
                message: e.to_string(),
            })?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(DataError::RateLimited {
                provider: PROVIDER.into(),
                message: format!("HTTP {status}"),
            });
        }
        if !status.is_success() {
            return Err(DataError::Upstream {
                provider: PROVIDER.into(),
                message: format!("HTTP {status} for {symbol}"),
            });
        }

        let body: Value = resp.json().map_err(|e| DataError::UnexpectedUpstreamShape {
            provider: PROVIDER.into(),
            message: format!("failed to parse response for {symbol}: {e}"),
        })?;

        let mut series = Self::parse_response(symbol, timeframe, &body)?;
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
            source: DataSource::AlphaVantage,
            requests: 1,
        })
    }
}

/// Zone named by `Meta Data` (`"6. Time Zone"` intraday, `"5. Time Zone"` daily).
fn exchange_zone(obj: &Map<String, Value>) -> Result<Tz, DataError> {
    let named = obj
        .get("Meta Data")
        .and_then(Value::as_object)
        .and_then(|meta| {
            meta.iter()
                .find(|(k, _)| k.ends_with("Time Zone"))
                .and_then(|(_, v)| v.as_str())
        });
    match named {
        Some(name) => name.trim().parse::<Tz>().map_err(|_| DataError::UnexpectedUpstreamShape {
            provider: PROVIDER.into(),
            message: format!("unknown time zone '{name}'"),
        }),
        None => Ok(DEFAULT_EXCHANGE_TZ),
    }
}

/// Local wall time to naive UTC. Ambiguous (fall-back) stamps take the earlier
/// instant; stamps inside a spring-forward gap shift forward one hour.
pub fn local_to_utc(local: NaiveDateTime, zone: Tz) -> NaiveDateTime {
    let resolved = zone
        .from_local_datetime(&local)
        .earliest()
        .or_else(|| zone.from_local_datetime(&(local + ChronoDuration::hours(1))).earliest());
    match resolved {
        Some(at) => at.naive_utc(),
        None => local,
    }
}

fn text_of(v: &Value) -> String {
    v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string())
}

fn keys_of(obj: &Map<String, Value>) -> String {
    obj.keys().cloned().collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Bias, SignalSnapshot};
    use crate::engine::bar_index_for;
    use chrono::Utc;
    use serde_json::json;

    fn av_bar(o: &str, h: &str, l: &str, c: &str, v: &str) -> Value {
        json!({"1. open": o, "2. high": h, "3. low": l, "4. close": c, "5. volume": v})
    }

    #[test]
    fn parses_daily_series() {
        let tf = Timeframe::parse("1d").unwrap();
        let body = json!({
            "Meta Data": {},
            "Time Series (Daily)": {
                "2024-01-03": av_bar("101", "103", "100", "102", "1100"),
                "2024-01-02": av_bar("100", "102", "99", "101", "1000"),
            }
        });
        let s = AlphaVantageFeed::parse_response("SPY", &tf, &body).unwrap();
        assert_eq!(s.kind(), BarKind::Daily);
        assert_eq!(s.len(), 2);
        assert_eq!(s.first_key().unwrap().as_str(), "2024-01-02");
        let (_, first) = s.iter().next().unwrap();
        assert_eq!(first.close, 101.0);
        assert_eq!(first.volume, 1000.0);
    }

    #[test]
    fn parses_intraday_series_under_interval_key() {
        let tf = Timeframe::parse("1h").unwrap();
        let body = json!({
            "Time Series (60min)": {
                "2024-01-02 10:00:00": av_bar("1", "2", "0.5", "1.5", "10"),
            }
        });
        let s = AlphaVantageFeed::parse_response("AAPL", &tf, &body).unwrap();
        // No Meta Data: Eastern is assumed (EST in January, UTC-5)
        assert_eq!(s.first_key().unwrap().as_str(), "2024-01-02 15:00:00");
    }

    fn eastern_hourly_body() -> Value {
        json!({
            "Meta Data": {
                "1. Information": "Intraday (60min) open, high, low, close prices and volume",
                "2. Symbol": "SPY",
                "4. Interval": "60min",
                "6. Time Zone": "US/Eastern"
            },
            "Time Series (60min)": {
                "2024-03-05 10:00:00": av_bar("500", "501", "499", "500.5", "100"),
                "2024-03-05 11:00:00": av_bar("500.5", "502", "500", "501", "100"),
                "2024-03-05 15:00:00": av_bar("501", "503", "500", "502", "100"),
                "2024-03-05 16:00:00": av_bar("502", "503", "501", "502.5", "100"),
            }
        })
    }

    #[test]
    fn intraday_stamps_are_converted_from_exchange_zone_to_utc() {
        let tf = Timeframe::parse("1h").unwrap();
        let s = AlphaVantageFeed::parse_response("SPY", &tf, &eastern_hourly_body()).unwrap();
        let keys: Vec<&str> = s.keys().map(|k| k.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "2024-03-05 15:00:00",
                "2024-03-05 16:00:00",
                "2024-03-05 20:00:00",
                "2024-03-05 21:00:00",
            ]
        );
    }

    #[test]
    fn utc_snapshot_maps_to_the_next_exchange_bar() {
        let tf = Timeframe::parse("1h").unwrap();
        let s = AlphaVantageFeed::parse_response("SPY", &tf, &eastern_hourly_body()).unwrap();
        let keys: Vec<BarKey> = s.keys().cloned().collect();
        // 15:30Z is 10:30 Eastern, so the 11:00 Eastern bar
        let snap = SignalSnapshot {
            packet_id: "p".into(),
            symbol: "SPY".into(),
            signal_source: "scanner_intraday".into(),
            created_at: Utc.with_ymd_and_hms(2024, 3, 5, 15, 30, 0).unwrap(),
            signal_score: Some(80.0),
            bias: Bias::Bullish,
            status: "active".into(),
            entry_zone: None,
            invalidation: None,
            targets: vec![],
        };
        assert_eq!(bar_index_for(&keys, BarKind::Intraday, &snap), 1);
    }

    #[test]
    fn summer_stamps_use_daylight_offset() {
        let day = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        let utc = local_to_utc(day.and_hms_opt(9, 30, 0).unwrap(), DEFAULT_EXCHANGE_TZ);
        assert_eq!(utc, day.and_hms_opt(13, 30, 0).unwrap());
    }

    #[test]
    fn unknown_time_zone_is_unexpected_shape() {
        let tf = Timeframe::parse("1h").unwrap();
        let body = json!({
            "Meta Data": {"6. Time Zone": "Mars/Olympus"},
            "Time Series (60min)": {}
        });
        let err = AlphaVantageFeed::parse_response("SPY", &tf, &body).unwrap_err();
        assert!(matches!(err, DataError::UnexpectedUpstreamShape { .. }));
    }

    #[test]
    fn daily_keys_ignore_time_zone() {
        let tf = Timeframe::parse("1d").unwrap();
        let body = json!({
            "Meta Data": {"5. Time Zone": "US/Eastern"},
            "Time Series (Daily)": {
                "2024-01-02": av_bar("100", "102", "99", "101", "1000"),
            }
        });
        let s = AlphaVantageFeed::parse_response("SPY", &tf, &body).unwrap();
        assert_eq!(s.first_key().unwrap().as_str(), "2024-01-02");
    }

    #[test]
    fn error_message_is_invalid_symbol() {
        let tf = Timeframe::parse("1d").unwrap();
        let body = json!({"Error Message": "Invalid API call."});
        let err = AlphaVantageFeed::parse_response("NOPE", &tf, &body).unwrap_err();
        assert!(matches!(err, DataError::InvalidSymbol { ref symbol, .. } if symbol == "NOPE"));
    }

    #[test]
    fn note_is_rate_limit_not_invalid_symbol() {
        let tf = Timeframe::parse("1d").unwrap();
        let body = json!({"Note": "Thank you for using Alpha Vantage! 5 calls per minute."});
        let err = AlphaVantageFeed::parse_response("SPY", &tf, &body).unwrap_err();
        assert!(matches!(err, DataError::RateLimited { .. }));

        let body = json!({"Information": "rate limit"});
        let err = AlphaVantageFeed::parse_response("SPY", &tf, &body).unwrap_err();
        assert!(matches!(err, DataError::RateLimited { .. }));
    }

    #[test]
    fn missing_series_is_unexpected_shape() {
        let tf = Timeframe::parse("1h").unwrap();
        let body = json!({"Time Series (Daily)": {}});
        let err = AlphaVantageFeed::parse_response("SPY", &tf, &body).unwrap_err();
        match err {
            DataError::UnexpectedUpstreamShape { message, .. } => {
                assert!(message.contains("Time Series (60min)"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn malformed_numbers_are_skipped() {
        let tf = Timeframe::parse("1d").unwrap();
        let body = json!({
            "Time Series (Daily)": {
                "2024-01-02": av_bar("100", "102", "99", "101", "1000"),
                "2024-01-03": av_bar("n/a", "102", "99", "101", "1000"),
            }
        });
        let s = AlphaVantageFeed::parse_response("SPY", &tf, &body).unwrap();
        assert_eq!(s.len(), 1);
    }
}
