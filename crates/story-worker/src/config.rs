//! Worker configuration.

use std::time::Duration;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Executor slots: jobs running at the same time
    pub max_concurrent_jobs: usize,
    /// Sub-tasks of one job dispatched at the same time
    pub max_fanout: usize,
    /// Hard limit on one job's run time
    pub task_time_limit: Duration,
    /// Jobs served by one generation backend before it is rebuilt
    pub max_tasks_per_backend: u32,
    /// Script generations tried before the script job fails
    pub script_attempts: u32,
    /// How long a consume call waits for new work
    pub consume_block: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            max_fanout: 4,
            task_time_limit: Duration::from_secs(600), // 10 minutes
            max_tasks_per_backend: 50,
            script_attempts: 3,
            consume_block: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            max_concurrent_jobs: std::env::var("WORKER_MAX_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
            max_fanout: std::env::var("WORKER_MAX_FANOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(4),
            task_time_limit: Duration::from_secs(
                std::env::var("WORKER_TASK_TIME_LIMIT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
            max_tasks_per_backend: std::env::var("WORKER_MAX_TASKS_PER_BACKEND")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(50),
            script_attempts: std::env::var("WORKER_SCRIPT_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
            consume_block: Duration::from_millis(
                std::env::var("WORKER_CONSUME_BLOCK_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1000),
            ),
            shutdown_timeout: Duration::from_secs(
                std::env::var("WORKER_SHUTDOWN_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }
}
