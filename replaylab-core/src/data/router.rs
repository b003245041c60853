//! Routes a fetch to the equity or crypto feed by asset class.

use chrono::NaiveDate;

use super::provider::{DataError, FetchResult, PriceFeed};
use crate::domain::AssetClass;
use crate::timeframe::Timeframe;

pub struct FeedRouter {
    equity: Box<dyn PriceFeed>,
    crypto: Box<dyn PriceFeed>,
    /// Forces every symbol onto one feed when set.
    forced: Option<AssetClass>,
}

impl FeedRouter {
    pub fn new(equity: Box<dyn PriceFeed>, crypto: Box<dyn PriceFeed>) -> Self {
        Self {
            equity,
            crypto,
            forced: None,
        }
    }

    pub fn with_asset_class(mut self, class: Option<AssetClass>) -> Self {
        self.forced = class;
        self
    }

    pub fn class_for(&self, symbol: &str) -> AssetClass {
        self.forced.unwrap_or_else(|| AssetClass::detect(symbol))
    }

    pub fn feed_for(&self, symbol: &str) -> &dyn PriceFeed {
        match self.class_for(symbol) {
            AssetClass::Equity => self.equity.as_ref(),
            AssetClass::Crypto => self.crypto.as_ref(),
        }
    }
}

impl PriceFeed for FeedRouter {
    fn name(&self) -> &str {
        "router"
    }

    fn fetch(
        &self,
        symbol: &str,
        timeframe: &Timeframe,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<FetchResult, DataError> {
        let feed = self.feed_for(symbol);
        tracing::debug!(symbol, feed = feed.name(), "routing price fetch");
        feed.fetch(symbol, timeframe, start, end)
    }
}
