//! Utility modules for jx

pub mod dryrun;
pub mod errors;
pub mod logger;
pub mod prereqs;
pub mod progress;
pub mod prompt;
pub mod retry;
pub mod strings;

// Re-export commonly used items
pub use errors::JxError;
pub use logger::{log_error, log_info, log_warn};
pub use prereqs::{CommonPrereqs, Prerequisite};
pub use prompt::{confirm, confirm_destructive};
