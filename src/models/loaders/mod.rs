pub mod toml_loader;

pub use toml_loader::{load_all_submission_requests, load_submission_request, mark_processed};
