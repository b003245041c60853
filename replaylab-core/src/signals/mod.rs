//! Recorded trading signals: store access, querying and snapshot loading.

pub mod loader;
pub mod query;
pub mod sqlite;
pub mod store;

pub use loader::{
    coerce, coerce_records, load_snapshots, parse_bias, parse_timestamp, LoadedSnapshots,
};
pub use query::{like_match, SignalQuery, SourceFilter};
pub use sqlite::SqliteSignalStore;
pub use store::{MemorySignalStore, SignalStore, StoreError};
