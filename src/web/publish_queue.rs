//! Background upload queue for published models.
//!
//! Routes submit `PublishJob`s to a bounded MPSC channel and return right
//! away. A single worker task uploads them one at a time via `spawn_blocking`.
//! There is no result channel back to the caller: outcomes are only logged.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;

use merge_control_types::{sys_error, sys_info, ControlError, ControlResult};

use super::hub_client::ModelRegistry;

/// One folder to upload to one registry repository.
#[derive(Debug, Clone)]
pub struct PublishJob {
    pub repo_id: String,
    pub folder: PathBuf,
}

/// Cloneable handle that route handlers use to submit uploads.
#[derive(Clone)]
pub struct PublishQueue {
    tx: mpsc::Sender<PublishJob>,
}

impl PublishQueue {
    /// Create the queue and spawn the background worker. Must be called
    /// from within a tokio runtime.
    pub fn spawn(capacity: usize, registry: Arc<dyn ModelRegistry>) -> Self {
        let (tx, rx) = mpsc::channel::<PublishJob>(capacity.max(1));
        tokio::spawn(publish_worker(rx, registry));
        Self { tx }
    }

    /// Queue an upload. Waits if the queue is full.
    pub async fn submit(&self, job: PublishJob) -> ControlResult<()> {
        self.tx
            .send(job)
            .await
            .map_err(|_| ControlError::Registry("publish queue closed".to_string()))
    }
}

/// Long-lived task that pulls uploads off the channel one at a time.
async fn publish_worker(mut rx: mpsc::Receiver<PublishJob>, registry: Arc<dyn ModelRegistry>) {
    while let Some(job) = rx.recv().await {
        let repo_id = job.repo_id.clone();
        sys_info!("[PUBLISH] Uploading {} to {}", job.folder.display(), repo_id);

        let registry = registry.clone();
        let result = tokio::task::spawn_blocking(move || upload(registry.as_ref(), &job)).await;

        match result {
            Ok(Ok(())) => sys_info!("[PUBLISH] Upload to {} finished", repo_id),
            Ok(Err(e)) => sys_error!("[PUBLISH] Upload to {} failed: {}", repo_id, e),
            Err(e) => sys_error!("[PUBLISH] Upload task for {} panicked: {}", repo_id, e),
        }
    }
}

fn upload(registry: &dyn ModelRegistry, job: &PublishJob) -> ControlResult<()> {
    registry.create_repo(&job.repo_id)?;
    registry.upload_folder(&job.repo_id, &job.folder)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Registry double that records calls and can be told to fail.
    #[derive(Default)]
    pub(crate) struct RecordingRegistry {
        pub calls: Mutex<Vec<String>>,
        pub fail_create: bool,
    }

    impl ModelRegistry for RecordingRegistry {
        fn create_repo(&self, repo_id: &str) -> ControlResult<()> {
            self.calls.lock().unwrap().push(format!("create {repo_id}"));
            if self.fail_create {
                return Err(ControlError::Registry("boom".to_string()));
            }
            Ok(())
        }

        fn upload_folder(&self, repo_id: &str, folder: &Path) -> ControlResult<()> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("upload {repo_id} {}", folder.display()));
            Ok(())
        }
    }

    pub(crate) async fn wait_for_calls(registry: &RecordingRegistry, count: usize) -> Vec<String> {
        for _ in 0..200 {
            {
                let calls = registry.calls.lock().unwrap();
                if calls.len() >= count {
                    return calls.clone();
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        registry.calls.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn test_worker_creates_then_uploads() {
        let registry = Arc::new(RecordingRegistry::default());
        let queue = PublishQueue::spawn(4, registry.clone());

        queue
            .submit(PublishJob {
                repo_id: "team/model".to_string(),
                folder: PathBuf::from("/tmp/merged"),
            })
            .await
            .unwrap();

        let calls = wait_for_calls(&registry, 2).await;
        assert_eq!(calls, vec!["create team/model", "upload team/model /tmp/merged"]);
    }

    #[tokio::test]
    async fn test_failed_upload_does_not_stop_worker() {
        let registry = Arc::new(RecordingRegistry {
            fail_create: true,
            ..RecordingRegistry::default()
        });
        let queue = PublishQueue::spawn(4, registry.clone());

        for name in ["team/a", "team/b"] {
            queue
                .submit(PublishJob {
                    repo_id: name.to_string(),
                    folder: PathBuf::from("/tmp/merged"),
                })
                .await
                .unwrap();
        }

        // Create fails, so upload is never attempted; the second job still runs
        let calls = wait_for_calls(&registry, 2).await;
        assert_eq!(calls, vec!["create team/a", "create team/b"]);
    }
}
