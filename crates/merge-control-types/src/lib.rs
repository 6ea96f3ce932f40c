//! Shared types for the merge control plane: the error taxonomy, job
//! snapshots, host usage statistics and the logging macros every crate in
//! the workspace uses.

pub mod error;
pub mod job;
pub mod logging;
pub mod stats;

pub use error::{ControlError, ControlResult};
pub use job::{JobSnapshot, JobStatus};
pub use stats::{DiskUsage, RamUsage};

#[doc(hidden)]
pub use log as __log;
