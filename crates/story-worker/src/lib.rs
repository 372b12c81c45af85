//! Executor pool for story generation jobs.
//!
//! This crate provides:
//! - The job executor: bounded slots, per-job time limit, backend rotation
//! - One job body per generation capability
//! - Fan-out of batch capabilities with incremental partial results
//! - Graceful shutdown

pub mod config;
pub mod error;
pub mod executor;
pub mod fanout;
pub mod logging;
pub mod retry;
pub mod tasks;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::{BackendFactory, JobExecutor};
pub use fanout::FanOut;
pub use logging::JobLogger;
