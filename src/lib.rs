//! Merge control service.
//!
//! Runs `mergekit-yaml` jobs as supervised child processes, stores their YAML
//! configurations, reports host resource usage and publishes merged models
//! to a model hub. Process supervision lives in `merge-control-jobs`; this
//! crate holds the HTTP surface.

pub mod web;
