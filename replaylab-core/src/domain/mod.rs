//! Domain types for ReplayLab

pub mod bar;
pub mod instrument;
pub mod snapshot;
pub mod trade;

pub use bar::{BarKey, BarKind, PriceBar, PriceSeries, SeriesColumns};
pub use instrument::{crypto_base, symbol_variants, AssetClass};
pub use snapshot::{Bias, SignalSnapshot};
pub use trade::{Excursion, ExitReason, Side, Trade};

/// Symbol type alias
pub type Symbol = String;
