//! Bars and price series — the fundamental market data units.
//!
//! A [`BarKey`] is the textual timestamp of one bar: `YYYY-MM-DD` for daily
//! bars and `YYYY-MM-DD HH:MM:SS` for intraday bars. Keys of one kind sort
//! lexicographically in chronological order, and the whole replay pipeline
//! leans on that: a [`PriceSeries`] is a `BTreeMap` keyed by `BarKey`, so
//! iteration order is time order.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

pub const DAILY_KEY_FORMAT: &str = "%Y-%m-%d";
pub const INTRADAY_KEY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Granularity of a bar key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarKind {
    Intraday,
    Daily,
}

/// Timestamp key of one OHLCV bar.
///
/// Equality, ordering and hashing use the key text only.
#[derive(Debug, Clone)]
pub struct BarKey {
    text: String,
    at: NaiveDateTime,
    kind: BarKind,
}

impl BarKey {
    pub fn daily(date: NaiveDate) -> Self {
        Self {
            text: date.format(DAILY_KEY_FORMAT).to_string(),
            at: date.and_time(NaiveTime::MIN),
            kind: BarKind::Daily,
        }
    }

    pub fn intraday(at: NaiveDateTime) -> Self {
        Self {
            text: at.format(INTRADAY_KEY_FORMAT).to_string(),
            at,
            kind: BarKind::Intraday,
        }
    }

    /// Key for `at` in the given granularity (daily keys drop the time of day).
    pub fn for_kind(at: NaiveDateTime, kind: BarKind) -> Self {
        match kind {
            BarKind::Daily => Self::daily(at.date()),
            BarKind::Intraday => Self::intraday(at),
        }
    }

    /// Parse either key format. Returns `None` for anything else.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if let Ok(at) = NaiveDateTime::parse_from_str(text, INTRADAY_KEY_FORMAT) {
            return Some(Self::intraday(at));
        }
        // Providers sometimes omit seconds on intraday stamps
        if let Ok(at) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M") {
            return Some(Self::intraday(at));
        }
        NaiveDate::parse_from_str(text, DAILY_KEY_FORMAT)
            .ok()
            .map(Self::daily)
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn kind(&self) -> BarKind {
        self.kind
    }

    pub fn date(&self) -> NaiveDate {
        self.at.date()
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.at
    }
}

impl PartialEq for BarKey {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}

impl Eq for BarKey {}

impl PartialOrd for BarKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BarKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.text.cmp(&other.text)
    }
}

impl Hash for BarKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.text.hash(state);
    }
}

impl fmt::Display for BarKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl Serialize for BarKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text)
    }
}

impl<'de> Deserialize<'de> for BarKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        BarKey::parse(&text)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid bar key '{text}'")))
    }
}

/// One OHLCV observation. Immutable once fetched.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PriceBar {
    /// All fields finite and non-negative.
    pub fn is_valid(&self) -> bool {
        [self.open, self.high, self.low, self.close, self.volume]
            .iter()
            .all(|v| v.is_finite() && *v >= 0.0)
    }

    /// Basic OHLC sanity: high >= low, high >= open/close, low <= open/close.
    pub fn is_sane(&self) -> bool {
        if !self.is_valid() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.close > 0.0
    }
}

/// Chronologically ordered mapping from [`BarKey`] to [`PriceBar`].
///
/// All keys share one [`BarKind`]; inserts of the other kind are refused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    kind: BarKind,
    bars: BTreeMap<BarKey, PriceBar>,
}

/// Column view of a series, indexed by bar position.
#[derive(Debug, Clone, Default)]
pub struct SeriesColumns {
    pub keys: Vec<BarKey>,
    pub opens: Vec<f64>,
    pub highs: Vec<f64>,
    pub lows: Vec<f64>,
    pub closes: Vec<f64>,
}

impl SeriesColumns {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl PriceSeries {
    pub fn new(kind: BarKind) -> Self {
        Self {
            kind,
            bars: BTreeMap::new(),
        }
    }

    /// Build a series, dropping any bar whose key kind does not match.
    pub fn from_bars(kind: BarKind, bars: impl IntoIterator<Item = (BarKey, PriceBar)>) -> Self {
        let mut series = Self::new(kind);
        for (key, bar) in bars {
            series.insert(key, bar);
        }
        series
    }

    /// Insert a bar. Returns false (and leaves the series untouched) on a
    /// granularity mismatch. A repeated key replaces the earlier bar.
    pub fn insert(&mut self, key: BarKey, bar: PriceBar) -> bool {
        if key.kind() != self.kind {
            return false;
        }
        self.bars.insert(key, bar);
        true
    }

    pub fn kind(&self) -> BarKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn get(&self, key: &BarKey) -> Option<&PriceBar> {
        self.bars.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&BarKey, &PriceBar)> {
        self.bars.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &BarKey> {
        self.bars.keys()
    }

    pub fn first_key(&self) -> Option<&BarKey> {
        self.bars.keys().next()
    }

    pub fn last_key(&self) -> Option<&BarKey> {
        self.bars.keys().next_back()
    }

    /// Bars whose calendar date falls in `[start, end]` (inclusive both ends).
    pub fn between_dates(&self, start: NaiveDate, end: NaiveDate) -> PriceSeries {
        let bars = self
            .bars
            .iter()
            .filter(|(k, _)| {
                let d = k.date();
                d >= start && d <= end
            })
            .map(|(k, b)| (k.clone(), *b))
            .collect();
        PriceSeries {
            kind: self.kind,
            bars,
        }
    }

    /// Split into parallel columns for index-based walking.
    pub fn columns(&self) -> SeriesColumns {
        let n = self.bars.len();
        let mut cols = SeriesColumns {
            keys: Vec::with_capacity(n),
            opens: Vec::with_capacity(n),
            highs: Vec::with_capacity(n),
            lows: Vec::with_capacity(n),
            closes: Vec::with_capacity(n),
        };
        for (key, bar) in &self.bars {
            cols.keys.push(key.clone());
            cols.opens.push(bar.open);
            cols.highs.push(bar.high);
            cols.lows.push(bar.low);
            cols.closes.push(bar.close);
        }
        cols
    }

    /// Merge another series of the same kind into this one (later bars win on
    /// duplicate keys). Returns the number of bars refused for kind mismatch.
    pub fn extend(&mut self, other: PriceSeries) -> usize {
        let mut refused = 0;
        for (key, bar) in other.bars {
            if !self.insert(key, bar) {
                refused += 1;
            }
        }
        refused
    }
}
