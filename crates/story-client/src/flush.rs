//! Debounced writes of the story document to the project mirror.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::config::FlushConfig;
use crate::error::ClientResult;
use crate::poller::PollHandle;
use crate::store::StoryStore;
use crate::sync::ProjectSync;

/// Writes the latest document to one project, at most one write at a time.
pub struct FlushScheduler {
    sync: Arc<dyn ProjectSync>,
    store: StoryStore,
    project_id: String,
    clock: Arc<dyn Clock>,
    config: FlushConfig,
    /// Held for the whole write. Stores the last revision written.
    flushed: Mutex<u64>,
}

impl FlushScheduler {
    /// The store's current revision is taken as already mirrored.
    pub fn new(
        sync: Arc<dyn ProjectSync>,
        store: StoryStore,
        project_id: impl Into<String>,
        clock: Arc<dyn Clock>,
        config: FlushConfig,
    ) -> Self {
        let flushed = Mutex::new(store.state().revision);
        Self {
            sync,
            store,
            project_id: project_id.into(),
            clock,
            config,
            flushed,
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Write the latest document unless it is already mirrored.
    ///
    /// Calls made while a write is in flight wait for it, then at most one of
    /// them writes whatever changed in the meantime. Returns whether this call
    /// wrote.
    pub async fn flush_now(&self) -> ClientResult<bool> {
        let mut flushed = self.flushed.lock().await;
        let state = self.store.state();
        if state.revision <= *flushed {
            return Ok(false);
        }
        self.sync.update(&self.project_id, &state.document).await?;
        debug!(
            project_id = %self.project_id,
            revision = state.revision,
            "Flushed story document"
        );
        *flushed = state.revision;
        Ok(true)
    }

    /// Flush after every quiet period of `debounce` following a change,
    /// until `stop` is cancelled. A last flush runs on stop.
    pub async fn run(self: Arc<Self>, stop: PollHandle) {
        let mut changes = self.store.subscribe();
        let _ = changes.borrow_and_update();

        'outer: loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                changed = changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }

            // Restart the quiet period on every further change.
            loop {
                tokio::select! {
                    biased;
                    _ = stop.cancelled() => break 'outer,
                    changed = changes.changed() => {
                        if changed.is_err() {
                            break 'outer;
                        }
                    }
                    _ = self.clock.sleep(self.config.debounce) => break,
                }
            }

            if let Err(e) = self.flush_now().await {
                warn!(project_id = %self.project_id, error = %e, "Flush failed");
            }
        }

        if let Err(e) = self.flush_now().await {
            warn!(project_id = %self.project_id, error = %e, "Final flush failed");
        }
    }
}
