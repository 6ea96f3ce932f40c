//! Model publishing.
//!
//! POST /upload_model/?merge_dir=<folder>&yaml_config=<name or path>
//! (a JSON body with the same keys is accepted too)
//! Writes the model card synchronously and queues the registry upload;
//! answers before the upload starts.

use std::convert::Infallible;
use std::path::Path;

use hyper::{Body, Request, Response, StatusCode};
use serde::Deserialize;

use merge_control_types::ControlError;

use crate::web::{
    request_parsing::{get_query_param, read_body},
    response_helpers::{error_response, json_error, json_response},
    state::SharedAppState,
};

#[derive(Deserialize, Default)]
struct PublishRequest {
    #[serde(default)]
    merge_dir: Option<String>,
    #[serde(default)]
    yaml_config: Option<String>,
}

pub async fn handle_publish(req: Request<Body>, state: SharedAppState) -> Result<Response<Body>, Infallible> {
    let mut request = PublishRequest {
        merge_dir: get_query_param(req.uri(), "merge_dir"),
        yaml_config: get_query_param(req.uri(), "yaml_config"),
    };

    if request.merge_dir.is_none() || request.yaml_config.is_none() {
        let body_bytes = match read_body(req.into_body()).await {
            Ok(bytes) => bytes,
            Err(error_response) => return Ok(error_response),
        };
        if !body_bytes.is_empty() {
            match serde_json::from_slice::<PublishRequest>(&body_bytes) {
                Ok(body) => {
                    request.merge_dir = request.merge_dir.or(body.merge_dir);
                    request.yaml_config = request.yaml_config.or(body.yaml_config);
                }
                Err(_) => return Ok(json_error(StatusCode::BAD_REQUEST, "Invalid JSON format")),
            }
        }
    }

    let (Some(merge_dir), Some(yaml_config)) = (request.merge_dir, request.yaml_config) else {
        return Ok(error_response(&ControlError::invalid_request(
            "merge_dir and yaml_config are required",
        )));
    };

    match state.publisher.publish(Path::new(&merge_dir), &yaml_config).await {
        Ok(ticket) => Ok(json_response(
            StatusCode::OK,
            &serde_json::json!({
                "message": "Model upload started successfully",
                "repo_id": ticket.repo_id,
            }),
        )),
        Err(e) => Ok(error_response(&e)),
    }
}
