//! Poll analytics pipeline
//!
//! Covers the ingest side of the system: privacy-preserving visitor
//! fingerprinting, request-context classification, fail-open event
//! recording, and recomputation of the derived summary metrics.

pub mod client_ip;
pub mod context;
pub mod fingerprint;
pub mod metrics;
pub mod models;
pub mod recorder;

pub use metrics::MetricUpdater;
pub use models::PollAnalyticsSummary;
pub use recorder::EventRecorder;

use std::time::{SystemTime, UNIX_EPOCH};

/// Current unix time in seconds. A clock before the epoch degrades to 0
/// instead of failing an ingest path.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
