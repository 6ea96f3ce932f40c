// HTTP control surface for merge jobs, configuration files and publishing

pub mod config_store;
pub mod hub_client;
pub mod logger;
pub mod model_card;
pub mod publish_queue;
pub mod publisher;
pub mod request_parsing;
pub mod response_helpers;
pub mod router;
pub mod routes;
pub mod state;
pub mod system_stats;
