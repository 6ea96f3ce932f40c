use serde::{Deserialize, Serialize};

/// Lifecycle of a supervised merge process. Transitions only
/// `Running -> Finished`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Finished,
}

/// Point-in-time view of a job, returned by start and poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub pid: u32,
    pub status: JobStatus,
    pub output: String,
    pub merged_folder: String,
    pub yaml_file_path: String,
    /// Exit code once the process has been observed to exit. `None` while
    /// running, or when the process was ended by a signal.
    pub exit_code: Option<i32>,
    pub command: String,
    pub started_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&JobStatus::Running).unwrap(), r#""running""#);
        assert_eq!(serde_json::to_string(&JobStatus::Finished).unwrap(), r#""finished""#);
    }
}
