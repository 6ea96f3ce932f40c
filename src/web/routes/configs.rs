// Configuration file route handlers

use hyper::{Body, Request, Response, StatusCode};
use std::convert::Infallible;

use merge_control_types::ControlError;

use crate::web::{
    request_parsing::{disposition_filename, get_query_param, read_body},
    response_helpers::{error_response, json_response},
    state::SharedAppState,
};

/// Raw-body upload. The file name comes from `Content-Disposition` or `?filename=`.
pub async fn handle_upload(req: Request<Body>, state: SharedAppState) -> Result<Response<Body>, Infallible> {
    let filename = req
        .headers()
        .get("content-disposition")
        .and_then(|h| h.to_str().ok())
        .and_then(disposition_filename)
        .or_else(|| get_query_param(req.uri(), "filename"));

    let Some(filename) = filename else {
        return Ok(error_response(&ControlError::invalid_request("filename not provided")));
    };

    let body_bytes = match read_body(req.into_body()).await {
        Ok(bytes) => bytes,
        Err(error_response) => return Ok(error_response),
    };

    match state.configs.save(&filename, &body_bytes) {
        Ok(path) => Ok(json_response(
            StatusCode::OK,
            &serde_json::json!({
                "filename": filename,
                "path": path.to_string_lossy(),
            }),
        )),
        Err(e) => Ok(error_response(&e)),
    }
}

pub fn handle_list(state: &SharedAppState) -> Result<Response<Body>, Infallible> {
    match state.configs.list() {
        Ok(names) => Ok(json_response(StatusCode::OK, &serde_json::json!({ "yaml_files": names }))),
        Err(e) => Ok(error_response(&e)),
    }
}

pub fn handle_delete(filename: Option<String>, state: &SharedAppState) -> Result<Response<Body>, Infallible> {
    let Some(filename) = filename.filter(|f| !f.is_empty()) else {
        return Ok(error_response(&ControlError::invalid_request("filename not provided")));
    };

    match state.configs.delete(&filename) {
        Ok(()) => Ok(json_response(
            StatusCode::OK,
            &serde_json::json!({
                "message": format!("YAML file '{filename}' deleted successfully"),
            }),
        )),
        // An unusable name can't refer to a stored file
        Err(ControlError::InvalidRequest(_)) => {
            Ok(error_response(&ControlError::not_found("File not found")))
        }
        Err(e) => Ok(error_response(&e)),
    }
}
