//! Multi-format analytics export
//!
//! Export requests run through a fixed sequence: validate, rate limit,
//! cache lookup, then on a miss fetch, serialize (CSV, JSON or XLSX),
//! cache store and return. Raw-granularity exports skip the cache and
//! draw from a stricter rate limiter. Every export carries metadata with
//! an MD5 checksum over the canonicalized data object.

pub mod cache;
pub mod csv;
pub mod data;
pub mod error;
pub mod metadata;
pub mod pipeline;
pub mod rate_limit;
pub mod request;
pub mod xlsx;

pub use cache::{CachedExport, ExportCache, MemoryExportCache};
pub use error::{ExportError, ExportResult};
pub use pipeline::{CompletedExport, ExportPipeline};
pub use rate_limit::{RateDecision, RateLimiter, TokenBucketLimiter};
pub use request::{
    validate_export_request, ExportFilters, ExportFormat, ExportGranularity, ExportRequest,
    ValidationReport,
};
