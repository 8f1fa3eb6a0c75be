pub mod feedback;
pub mod loaders;
pub mod settings;
pub mod submission;

pub use feedback::{Analysis, Feedback};
pub use loaders::{load_all_submission_requests, load_submission_request, mark_processed};
pub use settings::{GradingConstraints, SettingsRecord};
pub use submission::{estimate_processing_time, Submission, SubmissionStatus, SubmitRequest};
