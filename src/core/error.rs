use thiserror::Error;

/// Failure taxonomy for the hub core.
///
/// Nothing in here is fatal to the host process: producer loops log and
/// continue, dispatch failures terminate only their own dispatch, and
/// configuration absence disables the affected producer.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("remote service error: {0}")]
    RemoteService(String),

    #[error("process execution error: {0}")]
    ProcessExecution(String),

    #[error("lifecycle error: {0}")]
    Lifecycle(String),

    #[error("parse error: {0}")]
    Parse(String),
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Parse(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::RemoteService(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
