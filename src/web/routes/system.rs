// System monitoring route handlers

use hyper::{Body, Response, StatusCode};
use std::convert::Infallible;
use std::path::PathBuf;

use tokio::task::spawn_blocking;

use merge_control_types::ControlError;

use crate::web::response_helpers::{error_response, json_error, json_response};
use crate::web::system_stats;

pub async fn handle_ram_usage() -> Result<Response<Body>, Infallible> {
    match spawn_blocking(system_stats::ram).await {
        Ok(usage) => Ok(json_response(StatusCode::OK, &usage)),
        Err(e) => Ok(json_error(StatusCode::INTERNAL_SERVER_ERROR, &format!("Task failed: {e}"))),
    }
}

pub async fn handle_disk_usage(path: Option<String>) -> Result<Response<Body>, Infallible> {
    let Some(path) = path.filter(|p| !p.is_empty()) else {
        return Ok(error_response(&ControlError::invalid_request("path not provided")));
    };

    let path = PathBuf::from(path);
    match spawn_blocking(move || system_stats::disk(&path)).await {
        Ok(Ok(usage)) => Ok(json_response(StatusCode::OK, &usage)),
        Ok(Err(e)) => Ok(error_response(&e)),
        Err(e) => Ok(json_error(StatusCode::INTERNAL_SERVER_ERROR, &format!("Task failed: {e}"))),
    }
}
