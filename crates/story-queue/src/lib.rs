//! Job store and work queue.
//!
//! This crate provides:
//! - The job store holding every job's authoritative record (memory or Redis)
//! - The work queue feeding the executor pool (tokio channel or Redis Streams)
//! - The reporter an executor uses to write its job's lifecycle

pub mod config;
pub mod error;
pub mod queue;
pub mod reporter;
pub mod store;

pub use config::QueueConfig;
pub use error::{QueueError, QueueResult};
pub use queue::{Delivery, JobQueue, MemoryJobQueue, QueuedJob, RedisJobQueue};
pub use reporter::JobReporter;
pub use store::{JobStore, MemoryJobStore, RedisJobStore};
