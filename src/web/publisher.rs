// Publishing of merge output: model card now, registry upload in the background

use std::path::{Path, PathBuf};

use merge_control_types::{sys_info, ControlError, ControlResult};

use super::config_store::ConfigStore;
use super::model_card::{load_card_source, write_card, CardSource};
use super::publish_queue::{PublishJob, PublishQueue};

/// What a publish request was accepted as.
#[derive(Debug, Clone)]
pub struct PublishTicket {
    pub repo_id: String,
}

#[derive(Clone)]
pub struct ArtifactPublisher {
    configs: ConfigStore,
    queue: PublishQueue,
    default_namespace: String,
}

impl ArtifactPublisher {
    pub fn new(configs: ConfigStore, queue: PublishQueue, default_namespace: impl Into<String>) -> Self {
        Self {
            configs,
            queue,
            default_namespace: default_namespace.into(),
        }
    }

    /// Write the model card into `merge_dir` and queue the upload.
    ///
    /// `config_ref` is either a path to a configuration file or the name of
    /// one held in the config store. Returns once the upload is queued; its
    /// outcome is only logged.
    pub async fn publish(&self, merge_dir: &Path, config_ref: &str) -> ControlResult<PublishTicket> {
        if !merge_dir.is_dir() {
            return Err(ControlError::not_found(format!(
                "Merge folder not found: {}",
                merge_dir.display()
            )));
        }

        let config_path = self.resolve_config(config_ref)?;
        let source = load_card_source(&config_path)?;
        let repo_id = self.repo_id(&source)?;
        let card_path = write_card(merge_dir, &source)?;

        sys_info!("[PUBLISH] Wrote {}; queueing upload to {}", card_path.display(), repo_id);

        self.queue
            .submit(PublishJob {
                repo_id: repo_id.clone(),
                folder: merge_dir.to_path_buf(),
            })
            .await?;

        Ok(PublishTicket { repo_id })
    }

    fn resolve_config(&self, config_ref: &str) -> ControlResult<PathBuf> {
        if config_ref.trim().is_empty() {
            return Err(ControlError::invalid_request("YAML config not provided"));
        }
        let as_path = Path::new(config_ref);
        if as_path.is_file() {
            return Ok(as_path.to_path_buf());
        }
        self.configs.resolve(config_ref).map_err(|e| match e {
            // A reference that is neither an existing path nor a valid stored name
            ControlError::InvalidRequest(_) => {
                ControlError::not_found(format!("YAML file not found: {config_ref}"))
            }
            other => other,
        })
    }

    /// `<namespace>/<model name>`. Only the last segment of a model name such
    /// as `org/model` is used, so the id always has exactly one slash.
    fn repo_id(&self, source: &CardSource) -> ControlResult<String> {
        let namespace = source
            .user_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.default_namespace);
        let name = source
            .model_name
            .rsplit('/')
            .next()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| {
                ControlError::invalid_config(format!(
                    "model name {:?} does not end in a repository name",
                    source.model_name
                ))
            })?;
        Ok(format!("{namespace}/{name}"))
    }
}
