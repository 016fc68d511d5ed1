use std::{fmt, io, path::PathBuf};

use reqwest::StatusCode;

/// Where in an upload session a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Part(u32),
    Finalize,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Init => write!(f, "init"),
            Phase::Part(part_number) => write!(f, "part {}", part_number),
            Phase::Finalize => write!(f, "finalize"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variables: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("Unable to read environment: {0}")]
    Env(#[from] envy::Error),
}

/// Failure of the HTTP layer itself, before any status code is seen.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("invalid request URL: {0}")]
    Url(#[from] url::ParseError),
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{phase} request failed: {message}")]
    Protocol { phase: Phase, message: String },

    #[error("{phase} transfer failed: {message}")]
    Transfer { phase: Phase, message: String },

    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read {} for {phase}: {source}", .path.display())]
    Read {
        phase: Phase,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("File {} is empty, refusing to open an upload session", .0.display())]
    EmptyFile(PathBuf),

    #[error("Upload cancelled before {0}")]
    Cancelled(Phase),
}

impl UploadError {
    pub(crate) fn protocol(phase: Phase, message: impl Into<String>) -> Self {
        UploadError::Protocol {
            phase,
            message: message.into(),
        }
    }

    pub(crate) fn rejected(phase: Phase, status: StatusCode, body: &str) -> Self {
        UploadError::protocol(phase, status_message(status, body))
    }

    pub(crate) fn transfer(phase: Phase, message: impl Into<String>) -> Self {
        UploadError::Transfer {
            phase,
            message: message.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        UploadError::Io {
            path: path.into(),
            source,
        }
    }

    /// Ties a local read failure to the phase that needed the bytes.
    pub(crate) fn during(self, phase: Phase) -> Self {
        match self {
            UploadError::Io { path, source } => UploadError::Read {
                phase,
                path,
                source,
            },
            other => other,
        }
    }

    /// The session phase this error belongs to, if it happened inside one.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            UploadError::Protocol { phase, .. }
            | UploadError::Transfer { phase, .. }
            | UploadError::Read { phase, .. }
            | UploadError::Cancelled(phase) => Some(*phase),
            _ => None,
        }
    }

    /// Whether starting the whole upload over is known to be safe.
    ///
    /// Anything before finalize leaves at most an orphaned session behind.
    /// A finalize failure may have been partially applied by the server, so
    /// the caller has to decide.
    pub fn is_restartable(&self) -> bool {
        self.phase() != Some(Phase::Finalize)
    }
}

pub(crate) fn status_message(status: StatusCode, body: &str) -> String {
    if body.is_empty() {
        status.to_string()
    } else {
        format!("{} - {}", status, body)
    }
}
