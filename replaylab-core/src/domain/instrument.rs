//! Asset classes and symbol spelling rules.
//!
//! Signal storage and the price feeds do not agree on how a crypto pair is
//! spelled (`BTC`, `BTCUSD`, `BTC-USD`, `BTCUSDT`...). Everything that needs
//! to bridge the two goes through [`crypto_base`] and [`symbol_variants`].

use serde::{Deserialize, Serialize};

/// Bases treated as crypto even without a quote suffix.
const KNOWN_CRYPTO_BASES: &[&str] = &[
    "BTC", "ETH", "SOL", "XRP", "ADA", "DOGE", "DOT", "AVAX", "MATIC", "LINK", "LTC", "BNB",
    "SHIB", "TRX", "ATOM", "UNI", "XLM", "BCH", "NEAR", "APT", "ARB", "OP", "PEPE", "SUI",
];

/// Quote suffixes stripped from crypto symbols, longest first.
const QUOTE_SUFFIXES: &[&str] = &["-USDT", "-USD", "USDT", "USD"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    Equity,
    Crypto,
}

impl AssetClass {
    /// Classify a user-supplied symbol.
    pub fn detect(symbol: &str) -> AssetClass {
        let upper = symbol.trim().to_uppercase();
        if upper.contains("-USD") || upper.ends_with("USDT") {
            return AssetClass::Crypto;
        }
        if upper.ends_with("USD") && upper.len() > 3 {
            return AssetClass::Crypto;
        }
        if KNOWN_CRYPTO_BASES.contains(&upper.as_str()) {
            return AssetClass::Crypto;
        }
        AssetClass::Equity
    }
}

/// Strip a USD/USDT quote suffix (hyphenated or not). Upper-cases the result.
///
/// A symbol that is nothing but a suffix is returned as-is.
pub fn crypto_base(symbol: &str) -> String {
    let upper = symbol.trim().to_uppercase();
    for suffix in QUOTE_SUFFIXES {
        if let Some(base) = upper.strip_suffix(suffix) {
            if !base.is_empty() {
                return base.to_string();
            }
        }
    }
    upper
}

/// Equivalent spellings of one symbol, upper-cased, deduplicated, order-stable:
/// raw, base, `BASEUSD`, `BASEUSDT`, `BASE-USD`, `BASE-USDT`.
pub fn symbol_variants(symbol: &str) -> Vec<String> {
    let raw = symbol.trim().to_uppercase();
    let base = crypto_base(&raw);
    let candidates = [
        raw,
        base.clone(),
        format!("{base}USD"),
        format!("{base}USDT"),
        format!("{base}-USD"),
        format!("{base}-USDT"),
    ];

    let mut out: Vec<String> = Vec::with_capacity(candidates.len());
    for c in candidates {
        if !c.is_empty() && !out.contains(&c) {
            out.push(c);
        }
    }
    out
}
