//! OpsReview - operational review pipeline.
//!
//! Independent analyses of a managed service instance run concurrently,
//! each persists a typed result, and a final stage consolidates whatever
//! succeeded into one report.
//!
//! - [`coordinator`]: fan-out/fan-in scheduling and the review lifecycle
//! - [`invoker`]: one remote call per analysis, normalized to success/error
//! - [`store`]: keyed result storage with object and table backends
//! - [`aggregator`] / [`report`]: read-time consolidation of stored results

pub mod aggregator;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod invoker;
pub mod models;
pub mod report;
pub mod store;

pub use coordinator::{Coordinator, ReviewContext};
pub use invoker::{HttpTaskInvoker, TaskInvoker, TaskResult};
pub use models::{ReviewId, ReviewParameters, ReviewState, ReviewSummary};
pub use store::{open_store, ResultStore};
