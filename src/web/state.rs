// Shared state injected into every request handler

use std::sync::Arc;

use merge_control_config::Settings;
use merge_control_jobs::{JobSupervisor, SharedJobSupervisor};
use merge_control_types::ControlResult;

use super::config_store::ConfigStore;
use super::hub_client::{HubClient, ModelRegistry};
use super::publish_queue::PublishQueue;
use super::publisher::ArtifactPublisher;

pub struct AppState {
    pub supervisor: SharedJobSupervisor,
    pub configs: ConfigStore,
    pub publisher: ArtifactPublisher,
}

pub type SharedAppState = Arc<AppState>;

impl AppState {
    /// Wire up state from settings, using the Hub client as registry.
    /// Must be called from within a tokio runtime.
    pub fn from_settings(settings: &Settings) -> ControlResult<Self> {
        let registry: Arc<dyn ModelRegistry> =
            Arc::new(HubClient::new(&settings.hub_endpoint, settings.hub_token()));
        Self::with_registry(settings, registry)
    }

    pub fn with_registry(settings: &Settings, registry: Arc<dyn ModelRegistry>) -> ControlResult<Self> {
        let configs = ConfigStore::open(&settings.upload_dir)?;
        let queue = PublishQueue::spawn(settings.publish_queue_capacity, registry);
        let publisher = ArtifactPublisher::new(configs.clone(), queue, settings.hub_namespace.clone());

        Ok(Self {
            supervisor: Arc::new(JobSupervisor::new(settings.merge_command.clone())),
            configs,
            publisher,
        })
    }
}
