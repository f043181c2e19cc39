use crate::config::ConfigError;
use std::path::PathBuf;
use thiserror::Error;

/// Every failure the dispatch layer can report.
///
/// Authentication, selection and storage errors are always returned to the
/// caller. Transport failures are the only recoverable kind: the provider
/// boundary turns them into a degraded result unless strict mode is on.
#[derive(Debug, Error)]
pub enum SncError {
    #[error("not logged in; run `snc --user <user> --token <token>` first")]
    NotAuthenticated,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("model '{key}' is not in the catalog")]
    UnknownModel { key: String },

    #[error("model '{requested}' is not selected (current: {})", selected.as_deref().unwrap_or("none"))]
    NotSelected {
        requested: String,
        selected: Option<String>,
    },

    #[error("storage unavailable at {}: {source}", path.display())]
    StorageUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("transport failure{}: {message}", status.map(|s| format!(" (status {s})")).unwrap_or_default())]
    TransportFailure {
        status: Option<u16>,
        message: String,
    },

    #[error("malformed upstream frame: {0}")]
    MalformedUpstreamFrame(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl SncError {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: impl Into<std::io::Error>) -> Self {
        Self::StorageUnavailable {
            path: path.into(),
            source: source.into(),
        }
    }

    pub(crate) fn transport(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::TransportFailure {
            status,
            message: message.into(),
        }
    }

    /// Whether a degraded-but-valid result may stand in for this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::TransportFailure { .. })
    }
}

impl From<reqwest::Error> for SncError {
    fn from(err: reqwest::Error) -> Self {
        Self::transport(err.status().map(|s| s.as_u16()), err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SncError>;
