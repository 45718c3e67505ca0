pub mod postgres;
pub mod sqlite;
pub mod trait_def;

pub use postgres::PostgresStorage;
pub use sqlite::SqliteStorage;
pub use trait_def::{
    BreakdownDimension, EngagementAggregates, EngagementUpdate, EventFilter, EventKind, Storage,
    StorageError, StorageResult, SummaryCounter,
};
