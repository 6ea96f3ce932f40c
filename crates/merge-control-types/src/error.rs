use std::io;

use thiserror::Error;

pub type ControlResult<T> = Result<T, ControlError>;

#[derive(Debug, Error)]
pub enum ControlError {
    /// A required request field is missing or malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// A referenced file, job id or filesystem path does not exist.
    #[error("{0}")]
    NotFound(String),
    /// A configuration document matches none of the recognized shapes.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("template rendering failed: {0}")]
    Template(String),
    #[error("model registry error: {0}")]
    Registry(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ControlError {
    pub fn not_found(what: impl Into<String>) -> Self {
        ControlError::NotFound(what.into())
    }

    pub fn invalid_request(what: impl Into<String>) -> Self {
        ControlError::InvalidRequest(what.into())
    }

    pub fn invalid_config(what: impl Into<String>) -> Self {
        ControlError::InvalidConfig(what.into())
    }

    /// HTTP status code the gateway answers with for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            ControlError::InvalidRequest(_) => 400,
            ControlError::NotFound(_) => 404,
            ControlError::InvalidConfig(_) => 422,
            ControlError::Registry(_) => 502,
            ControlError::Io(e) if e.kind() == io::ErrorKind::NotFound => 404,
            ControlError::Spawn { .. } | ControlError::Template(_) | ControlError::Io(_) => 500,
        }
    }
}
