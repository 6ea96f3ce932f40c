// Request routing for the merge control web server

use std::convert::Infallible;

use hyper::{Body, Method, Request, Response, StatusCode};

use merge_control_types::sys_debug;

use super::request_parsing::{decode_segment, get_query_param};
use super::response_helpers::{cors_preflight, json_error};
use super::routes;
use super::state::SharedAppState;

pub async fn handle_request(req: Request<Body>, state: SharedAppState) -> Result<Response<Body>, Infallible> {
    if req.method() == Method::OPTIONS {
        return Ok(cors_preflight());
    }

    // Trailing slashes are optional on every route
    let raw_path = req.uri().path();
    let path = match raw_path.trim_end_matches('/') {
        "" => "/".to_string(),
        trimmed => trimmed.to_string(),
    };
    let method = req.method().clone();
    sys_debug!("[HTTP] {} {}", method, req.uri());

    match (&method, path.as_str()) {
        (&Method::GET, "/health") => routes::health::handle().await,

        // Merge jobs
        (&Method::POST, "/start") => routes::jobs::handle_start(req, state).await,
        (&Method::GET, "/get_pids") => routes::jobs::handle_list(&state),
        (&Method::GET | &Method::POST, p) if p.starts_with("/stop/") => {
            routes::jobs::handle_stop(&p["/stop/".len()..], &state)
        }
        (&Method::GET, p) if p.starts_with("/check_progress/") => {
            routes::jobs::handle_progress(&p["/check_progress/".len()..], &state).await
        }

        // Configuration files
        (&Method::POST, "/upload_yaml") => routes::configs::handle_upload(req, state).await,
        (&Method::GET, "/list_yaml_files") => routes::configs::handle_list(&state),
        (&Method::DELETE, "/delete_yaml_file") => {
            routes::configs::handle_delete(get_query_param(req.uri(), "filename"), &state)
        }
        (&Method::DELETE, p) if p.starts_with("/delete_yaml_file/") => {
            routes::configs::handle_delete(decode_segment(&p["/delete_yaml_file/".len()..]), &state)
        }

        // Publishing
        (&Method::POST, "/upload_model") => routes::publish::handle_publish(req, state).await,

        // Host statistics
        (&Method::GET, "/ram_usage") => routes::system::handle_ram_usage().await,
        (&Method::GET, "/hdd_usage") => {
            routes::system::handle_disk_usage(get_query_param(req.uri(), "path")).await
        }
        (&Method::GET, p) if p.starts_with("/hdd_usage/") => {
            routes::system::handle_disk_usage(decode_segment(&p["/hdd_usage/".len()..])).await
        }

        _ => Ok(json_error(StatusCode::NOT_FOUND, "Not Found")),
    }
}
