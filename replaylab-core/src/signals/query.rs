//! Signal store query and source filtering.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::symbol_variants;

/// Which signal sources qualify. Exact names and LIKE patterns are OR-ed;
/// an empty filter admits every source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFilter {
    #[serde(default)]
    pub exact: Vec<String>,
    /// SQL LIKE patterns (`%` any run, `_` one character).
    #[serde(default)]
    pub patterns: Vec<String>,
}

impl SourceFilter {
    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.patterns.is_empty()
    }

    pub fn matches(&self, source: &str) -> bool {
        if self.is_empty() {
            return true;
        }
        self.exact.iter().any(|e| e == source)
            || self.patterns.iter().any(|p| like_match(p, source))
    }
}

/// Everything a store needs to select candidate records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalQuery {
    pub workspace_id: String,
    /// Upper-cased equivalent spellings of the requested symbol.
    pub symbols: Vec<String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub sources: SourceFilter,
}

impl SignalQuery {
    pub fn new(
        workspace_id: impl Into<String>,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        sources: SourceFilter,
    ) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            symbols: symbol_variants(symbol),
            start,
            end,
            sources,
        }
    }

    pub fn matches_symbol(&self, symbol: &str) -> bool {
        let upper = symbol.trim().to_uppercase();
        self.symbols.iter().any(|s| *s == upper)
    }

    /// Inclusive calendar-date range check.
    pub fn covers(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

/// SQL LIKE semantics with SQLite's default ASCII case folding.
pub fn like_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().map(|c| c.to_ascii_lowercase()).collect();
    let t: Vec<char> = text.chars().map(|c| c.to_ascii_lowercase()).collect();

    // Greedy match with backtracking to the last '%'
    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;
    while ti < t.len() {
        if pi < p.len() && (p[pi] == '_' || (p[pi] != '%' && p[pi] == t[ti])) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '%' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|c| *c == '%')
}
