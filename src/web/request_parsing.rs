// Request parsing utilities for HTTP handlers

use hyper::body::Bytes;
use hyper::{Body, Response, StatusCode, Uri};
use serde::de::DeserializeOwned;

use merge_control_types::{sys_debug, sys_error};

use super::response_helpers::json_error;

/// Read a whole request body.
pub async fn read_body(body: Body) -> Result<Bytes, Response<Body>> {
    hyper::body::to_bytes(body).await.map_err(|e| {
        sys_error!("[REQUEST] Failed to read request body: {}", e);
        json_error(StatusCode::BAD_REQUEST, "Failed to read request body")
    })
}

/// Parse JSON request body into a typed structure.
///
/// Returns the deserialized value on success, or a 400 JSON error Response.
pub async fn parse_json_body<T: DeserializeOwned>(body: Body) -> Result<T, Response<Body>> {
    let body_bytes = read_body(body).await?;

    if let Ok(body_str) = std::str::from_utf8(&body_bytes) {
        if !body_str.is_empty() {
            sys_debug!("[REQUEST] Body: {}", body_str);
        }
    }

    serde_json::from_slice::<T>(&body_bytes).map_err(|e| {
        sys_error!("[REQUEST] JSON parsing error: {}", e);
        json_error(StatusCode::BAD_REQUEST, "Invalid JSON format")
    })
}

/// Extract a URL-decoded query parameter from URI.
pub fn get_query_param(uri: &Uri, key: &str) -> Option<String> {
    let query = uri.query()?;

    for param in query.split('&') {
        if let Some((param_key, param_value)) = param.split_once('=') {
            if param_key == key {
                let value = param_value.replace('+', " ");
                return urlencoding::decode(&value).ok().map(|s| s.into_owned());
            }
        }
    }

    None
}

/// URL-decode a single path segment.
pub fn decode_segment(segment: &str) -> Option<String> {
    urlencoding::decode(segment).ok().map(|s| s.into_owned())
}

/// File name from a `Content-Disposition` header value, if it names one.
pub fn disposition_filename(header: &str) -> Option<String> {
    header
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("filename="))
        .map(|name| name.trim_matches('"').to_string())
        .filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_query_param_basic() {
        let uri: Uri = "/api/test?foo=bar".parse().unwrap();
        assert_eq!(get_query_param(&uri, "foo"), Some("bar".to_string()));
    }

    #[test]
    fn test_get_query_param_url_encoded() {
        let uri: Uri = "/upload_model/?merge_dir=%2Fdata%2Fmerged&yaml_config=a%20b.yaml".parse().unwrap();
        assert_eq!(get_query_param(&uri, "merge_dir"), Some("/data/merged".to_string()));
        assert_eq!(get_query_param(&uri, "yaml_config"), Some("a b.yaml".to_string()));
    }

    #[test]
    fn test_get_query_param_plus_is_space() {
        let uri: Uri = "/x?filename=my+config.yaml".parse().unwrap();
        assert_eq!(get_query_param(&uri, "filename"), Some("my config.yaml".to_string()));
    }

    #[test]
    fn test_get_query_param_not_found() {
        let uri: Uri = "/api/test?foo=bar".parse().unwrap();
        assert_eq!(get_query_param(&uri, "missing"), None);
        let uri: Uri = "/api/test".parse().unwrap();
        assert_eq!(get_query_param(&uri, "foo"), None);
    }

    #[test]
    fn test_decode_segment() {
        assert_eq!(decode_segment("%2Fhome%2Fuser"), Some("/home/user".to_string()));
    }

    #[test]
    fn test_disposition_filename() {
        assert_eq!(
            disposition_filename(r#"attachment; filename="merge.yaml""#),
            Some("merge.yaml".to_string())
        );
        assert_eq!(
            disposition_filename("form-data; name=file; filename=slerp.yml"),
            Some("slerp.yml".to_string())
        );
        assert_eq!(disposition_filename("inline"), None);
        assert_eq!(disposition_filename(r#"attachment; filename="""#), None);
    }

    #[tokio::test]
    async fn test_parse_json_body_rejects_garbage() {
        let result: Result<serde_json::Value, _> = parse_json_body(Body::from("{nope")).await;
        assert_eq!(result.unwrap_err().status(), StatusCode::BAD_REQUEST);
    }
}
