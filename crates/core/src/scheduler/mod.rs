//! Batch scheduling.
//!
//! The [`Dispatcher`] owns one batch at a time: it extracts archives when
//! asked, discovers jobs, drops the ones the progress ledger already has,
//! sizes a worker pool from the host's resources and runs every remaining
//! job through a [`JobExecutor`](crate::executor::JobExecutor).
//!
//! Progress reaches callers through [`BatchObserver`] callbacks and the
//! final [`BatchSummary`]. A [`CancellationToken`] stops queued jobs while
//! letting running conversions finish.

mod dispatcher;
mod error;
mod observer;
mod stats;
mod types;

pub use dispatcher::{Dispatcher, PoolStatus};
pub use error::BatchError;
pub use observer::BatchObserver;
pub use stats::AggregateStats;
pub use types::{BatchRequest, BatchState, BatchSummary, FailedJob, ProgressUpdate};

pub use tokio_util::sync::CancellationToken;
