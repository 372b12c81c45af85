//! Client side of the story pipeline.
//!
//! - [`Poller`] follows one job to its terminal state
//! - [`StoryStore`] owns the story document and applies every change to it
//! - [`Orchestrator`] runs the stage graph against the job API
//! - [`FlushScheduler`] mirrors the document to the project store

pub mod api;
pub mod clock;
pub mod config;
pub mod error;
pub mod flush;
pub mod orchestrator;
pub mod poller;
pub mod signature;
pub mod store;
pub mod sync;

pub use api::{HttpJobApi, JobApi};
pub use clock::{Clock, ManualClock, TokioClock};
pub use config::{ClientConfig, FlushConfig, PollerConfig};
pub use error::{ClientError, ClientResult};
pub use flush::FlushScheduler;
pub use orchestrator::{can_generate_final_video, GateError, Orchestrator};
pub use poller::{PollHandle, Poller, ProgressUpdate};
pub use signature::input_signature;
pub use store::{reduce, Artifact, CutSources, Reduced, StoryAction, StoryState, StoryStore};
pub use sync::{HttpProjectSync, ProjectSync};
