use serde::Serialize;
use thiserror::Error;

/// Why a session ended in `Failed`.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SessionError {
    #[error("failed to start extraction tool: {0}")]
    LaunchFailure(String),

    #[error("extraction tool returned malformed output: {0}")]
    MalformedOutput(String),

    #[error("{diagnostic}")]
    ToolReportedError { code: i32, diagnostic: String },

    #[error("Cancelled")]
    Cancelled,
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::LaunchFailure(_) => ErrorKind::LaunchFailure,
            SessionError::MalformedOutput(_) => ErrorKind::MalformedOutput,
            SessionError::ToolReportedError { .. } => ErrorKind::ToolReportedError,
            SessionError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    LaunchFailure,
    MalformedOutput,
    ToolReportedError,
    Cancelled,
}

/// A request refused before any session was created.
#[derive(Debug, Error, PartialEq)]
pub enum SubmitError {
    #[error("no URL given")]
    EmptyUrl,

    #[error("unsupported URL: {0}")]
    UnsupportedUrl(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_error_displays_diagnostic_verbatim() {
        let e = SessionError::ToolReportedError {
            code: 1,
            diagnostic: "ERROR: Video unavailable".into(),
        };
        assert_eq!(e.to_string(), "ERROR: Video unavailable");
        assert_eq!(e.kind(), ErrorKind::ToolReportedError);
    }

    #[test]
    fn kinds_serialize_as_snake_case() {
        let json = serde_json::to_string(&ErrorKind::MalformedOutput).unwrap();
        assert_eq!(json, "\"malformed_output\"");
    }
}
