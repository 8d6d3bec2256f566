mod error_result;
mod parser;

use thiserror::Error;

pub use error_result::ErrorResult;
pub use parser::{check_response, http_error, is_not_found, transport_error, ErrorContext};

/// Every variant renders as the bare message a caller is meant to see: job
/// failures carrying an [`ErrorResult`] render as its serialized field set, all
/// other remote failures render the original message verbatim.
#[derive(Error, Debug)]
pub enum BqPipeError {
    /// The submission was accepted but its initial metadata already carries an error result.
    #[error("{0}")]
    Rejected(ErrorResult),

    /// The job's completion channel fired an error instead of completing.
    #[error("{0}")]
    JobFailed(String),

    /// The job completed but its terminal metadata carries an error result.
    #[error("{0}")]
    Failed(ErrorResult),

    #[error("{message}")]
    Transport { operation: String, message: String },

    #[error("{0}")]
    Serialize(#[source] serde_json::Error),

    #[error("{0}")]
    Decompress(#[source] std::io::Error),

    #[error("{source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Where in an operation a failure originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePhase {
    Submission,
    Execution,
    Completion,
    Transform,
    Local,
}

impl BqPipeError {
    pub fn transport(operation: impl Into<String>, message: impl Into<String>) -> Self {
        BqPipeError::Transport {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn phase(&self) -> FailurePhase {
        match self {
            BqPipeError::Rejected(_) | BqPipeError::Transport { .. } => FailurePhase::Submission,
            BqPipeError::JobFailed(_) => FailurePhase::Execution,
            BqPipeError::Failed(_) => FailurePhase::Completion,
            BqPipeError::Serialize(_)
            | BqPipeError::Decompress(_)
            | BqPipeError::Parse { .. } => FailurePhase::Transform,
            _ => FailurePhase::Local,
        }
    }

    /// The embedded error result, for the two variants that carry one.
    pub fn error_result(&self) -> Option<&ErrorResult> {
        match self {
            BqPipeError::Rejected(e) | BqPipeError::Failed(e) => Some(e),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, BqPipeError>;
