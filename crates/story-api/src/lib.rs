//! Axum HTTP API server.
//!
//! This crate provides:
//! - Job submission per generation capability and status polling
//! - The project store mirror for client story documents
//! - Health, readiness and Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod repository;
pub mod routes;
pub mod services;
pub mod state;

pub use config::{ApiConfig, StoreBackend};
pub use error::{ApiError, ApiResult};
pub use repository::{MemoryProjectRepository, ProjectRepository, RedisProjectRepository};
pub use routes::create_router;
pub use services::SubmissionService;
pub use state::AppState;
