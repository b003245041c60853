//! Market data: feeds, resampling, offline sources.

pub mod alpha_vantage;
pub mod binance;
pub mod csv_import;
pub mod provider;
pub mod resample;
pub mod router;
pub mod synthetic;

pub use alpha_vantage::{AlphaVantageConfig, AlphaVantageFeed};
pub use binance::{
    binance_pair, paginate_klines, BinanceConfig, BinanceFeed, Kline, PageLimits,
};
pub use csv_import::CsvPriceFeed;
pub use provider::{DataError, DataSource, FetchResult, PriceFeed};
pub use resample::resample;
pub use router::FeedRouter;
pub use synthetic::SyntheticFeed;
