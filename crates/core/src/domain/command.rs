use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Failure classes a request can resolve to. None of them is fatal to the process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    Forbidden,
    SecurityBlocked,
    MissingParameters,
    UpstreamUnavailable,
    StorageFailure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::Forbidden => "forbidden",
            Self::SecurityBlocked => "security_blocked",
            Self::MissingParameters => "missing_parameters",
            Self::UpstreamUnavailable => "upstream_unavailable",
            Self::StorageFailure => "storage_failure",
        }
    }
}

/// Terminal value of the dispatch stage. Built once, never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl CommandResult {
    pub fn ok(message: impl Into<String>, data: Option<Value>) -> Self {
        Self { success: true, message: message.into(), data, error_kind: None }
    }

    pub fn failed(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { success: false, message: message.into(), data: None, error_kind: Some(kind) }
    }

    pub fn is_kind(&self, kind: ErrorKind) -> bool {
        self.error_kind == Some(kind)
    }
}
