//! metricvault-sync: loads metrics stored-first, falling back to a
//! metrics source, and caches the aggregated result per request.

pub mod aggregate;
pub mod cache;
pub mod demo;
pub mod error;
pub mod source;
pub mod sync;

pub use aggregate::{DailyMetrics, aggregate_daily};
pub use cache::{CacheStats, QueryCache, QueryCacheConfig, QueryKey};
pub use demo::{DEMO_DAYS, DEMO_PROJECTS, DemoSource};
pub use error::{SourceError, SourceResult, SyncError, SyncResult};
pub use source::MetricsSource;
pub use sync::{DataOrigin, MetricsSync, ProjectOutcome, SyncReport};
