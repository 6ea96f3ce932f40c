//! Supervision of external merge processes.
//!
//! [`JobSupervisor`] launches the merge tool, keys each job by its OS process
//! id, accumulates combined stdout/stderr and supports fire-and-forget
//! termination. All registry access goes through a single mutex owned by the
//! supervisor; share it between request handlers as [`SharedJobSupervisor`].

pub mod invocation;
mod output;
pub mod supervisor;

pub use invocation::{MergeInvocation, MergeRequest, ShardSize};
pub use supervisor::{JobSupervisor, SharedJobSupervisor};
