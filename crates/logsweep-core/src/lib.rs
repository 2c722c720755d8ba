//! Adaptive interval-partitioning collection engine.
//!
//! Collects every record in a time range from an analytics API whose queries
//! silently truncate at a server-side row limit. The range is split into
//! aligned base intervals; each base interval is queried whole when it fits
//! under the limit and otherwise partitioned by binary search into windows
//! that do not truncate. Plans are memoized per base interval and filter
//! signature, and base intervals run on a bounded pool of concurrent tasks.
//!
//! The transport is injected through [`QueryService`]; output goes through an
//! [`ExportSink`].

pub mod aggregate;
pub mod cache;
pub mod cancel;
pub mod client;
pub mod collector;
pub mod error;
pub mod export;
pub mod filter;
pub mod interval;
pub mod service;
pub mod stats;
pub mod window;

pub use aggregate::{Aggregator, Collection, IntervalBatch};
pub use cache::{Lookup, PartitionCache, PlanKey};
pub use cancel::CancelFlag;
pub use client::{QueryClient, QueryOptions, QueryResult};
pub use collector::{Collector, CollectorOptions, UnsupportedFilterPolicy};
pub use error::{CollectError, ExportError, IntervalError, QueryError, ServiceError};
pub use export::ExportSink;
pub use filter::{FilterDimension, FilterSet, FilterSignature};
pub use interval::{Interval, InvalidInterval};
pub use service::{QueryService, Record};
pub use stats::{RunCounters, RunStatistics};
pub use window::{SearchOptions, WindowFinder, WindowPlan};
