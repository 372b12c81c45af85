//! Service layer.

pub mod submission;

pub use submission::SubmissionService;
