pub mod grading_flow;
pub mod submission_lifecycle;

pub use grading_flow::{GradingFlow, GradingOutcome};
pub use submission_lifecycle::{ReloadSummary, SubmissionLifecycle};
