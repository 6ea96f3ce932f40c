// Merge job route handlers

use hyper::{Body, Request, Response, StatusCode};
use std::convert::Infallible;

use tokio::task::spawn_blocking;

use merge_control_jobs::MergeRequest;

use crate::web::{
    request_parsing::parse_json_body,
    response_helpers::{error_response, json_error, json_response},
    state::SharedAppState,
};

pub async fn handle_start(req: Request<Body>, state: SharedAppState) -> Result<Response<Body>, Infallible> {
    let request: MergeRequest = match parse_json_body(req.into_body()).await {
        Ok(request) => request,
        Err(error_response) => return Ok(error_response),
    };

    // Spawning touches the filesystem and forks; keep it off the reactor
    let supervisor = state.supervisor.clone();
    match spawn_blocking(move || supervisor.start(&request)).await {
        Ok(Ok(job)) => Ok(json_response(
            StatusCode::OK,
            &serde_json::json!({
                "message": "Process started successfully",
                "pid": job.pid,
            }),
        )),
        Ok(Err(e)) => Ok(error_response(&e)),
        Err(e) => Ok(json_error(StatusCode::INTERNAL_SERVER_ERROR, &format!("Task failed: {e}"))),
    }
}

pub fn handle_stop(pid: &str, state: &SharedAppState) -> Result<Response<Body>, Infallible> {
    let Some(pid) = parse_pid(pid) else {
        return Ok(json_error(StatusCode::NOT_FOUND, "Process not found"));
    };

    match state.supervisor.stop(pid) {
        Ok(pid) => Ok(json_response(
            StatusCode::OK,
            &serde_json::json!({
                "message": "Process stopped successfully",
                "pid": pid,
            }),
        )),
        Err(e) => Ok(error_response(&e)),
    }
}

pub fn handle_list(state: &SharedAppState) -> Result<Response<Body>, Infallible> {
    let pids = state.supervisor.list();
    Ok(json_response(StatusCode::OK, &serde_json::json!({ "pids": pids })))
}

pub async fn handle_progress(pid: &str, state: &SharedAppState) -> Result<Response<Body>, Infallible> {
    let Some(pid) = parse_pid(pid) else {
        return Ok(json_error(StatusCode::NOT_FOUND, "Process not found"));
    };

    // May wait briefly for a just-exited job's pipes to close
    let supervisor = state.supervisor.clone();
    match spawn_blocking(move || supervisor.poll(pid)).await {
        Ok(Ok(snapshot)) => Ok(json_response(StatusCode::OK, &snapshot)),
        Ok(Err(e)) => Ok(error_response(&e)),
        Err(e) => Ok(json_error(StatusCode::INTERNAL_SERVER_ERROR, &format!("Task failed: {e}"))),
    }
}

fn parse_pid(raw: &str) -> Option<u32> {
    raw.trim().parse().ok()
}
