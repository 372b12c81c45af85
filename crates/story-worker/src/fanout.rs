//! Fan-out of a job over a sub-task list with incremental progress.

use std::future::Future;

use futures::stream::{self, StreamExt};
use serde::Serialize;

use story_models::batch_payload;
use story_queue::JobReporter;

use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;

/// How a batch is labelled and bounded.
#[derive(Debug, Clone, Copy)]
pub struct FanOut<'a> {
    /// Key the index-aligned results are published under
    pub key: &'a str,
    /// Human-readable item name used in status messages
    pub label: &'a str,
    /// Sub-tasks in flight at once
    pub max_concurrency: usize,
}

impl FanOut<'_> {
    /// Run `op` over every input.
    ///
    /// `total` is fixed to the input count before the first sub-task starts.
    /// Each successful completion writes `PROGRESS` with every result gathered
    /// so far, `null` standing in for sub-tasks still running. When a sub-task
    /// fails the remaining ones still run to completion and are recorded, then
    /// the first failure is returned.
    pub async fn run<I, T, F, Fut>(
        &self,
        reporter: &mut JobReporter,
        logger: &JobLogger,
        inputs: Vec<I>,
        op: F,
    ) -> WorkerResult<Vec<T>>
    where
        T: Serialize,
        F: Fn(usize, I) -> Fut,
        Fut: Future<Output = WorkerResult<T>>,
    {
        let total = inputs.len();
        let total_u32 = total as u32;
        let mut results: Vec<Option<T>> = std::iter::repeat_with(|| None).take(total).collect();

        reporter
            .progress(
                0,
                total_u32,
                format!("Starting {} generation...", self.label),
                Some(batch_payload(self.key, &results)),
            )
            .await?;

        let mut pending = stream::iter(inputs.into_iter().enumerate())
            .map(|(index, input)| {
                let work = op(index, input);
                async move { (index, work.await) }
            })
            .buffer_unordered(self.max_concurrency.max(1));

        let mut completed = 0u32;
        let mut first_failure = None;

        while let Some((index, outcome)) = pending.next().await {
            match outcome {
                Ok(value) => {
                    results[index] = Some(value);
                    completed += 1;
                    let status = format!("Generated {} {}/{}", self.label, completed, total);
                    logger.log_progress(completed, total_u32, &status);
                    reporter
                        .progress(
                            completed,
                            total_u32,
                            status,
                            Some(batch_payload(self.key, &results)),
                        )
                        .await?;
                }
                Err(e) => {
                    logger.log_error(&format!("{} {} failed: {}", self.label, index + 1, e));
                    first_failure.get_or_insert(WorkerError::SubTaskFailed {
                        index,
                        total,
                        message: e.to_string(),
                    });
                }
            }
        }

        if let Some(err) = first_failure {
            return Err(err);
        }

        results
            .into_iter()
            .collect::<Option<Vec<T>>>()
            .ok_or_else(|| WorkerError::job_failed(format!("{} batch ended incomplete", self.label)))
    }
}
