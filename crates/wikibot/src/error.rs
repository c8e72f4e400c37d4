use serde_json::Value;
use thiserror::Error;

/// Failure classes surfaced by the engine.
///
/// Single-operation callers can branch on [`Error::code`] / [`Error::info`];
/// bulk callers receive these inside positional outcome slots instead of as
/// overall rejections.
#[derive(Debug, Error)]
pub enum Error {
    /// No API endpoint configured; nothing was sent.
    #[error("no API URL configured")]
    MissingApiUrl,

    /// The HTTP call itself failed (connect, timeout, non-success status,
    /// undecodable body encoding). Never retried by the engine.
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with something that is not a JSON object.
    #[error("API returned a non-object body: {body}")]
    InvalidResponse { body: String },

    /// A well-formed response with a populated `error` field that the retry
    /// policy does not absorb, or a recoverable code past its retry ceiling.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The server rejected a multi-value field outright: the configured chunk
    /// cap exceeds what this account is permitted. A caller misconfiguration,
    /// not a per-chunk fault.
    #[error("multi-value field {field:?} exceeds the permitted limit of {limit} ({code})")]
    BatchLimit {
        field: String,
        limit: usize,
        code: String,
    },

    /// A response arrived but lacked the field the operation needs.
    #[error("API response did not contain {expected}")]
    MissingField {
        expected: &'static str,
        response: Value,
    },

    /// `action=login` did not report `Success`.
    #[error("login failed: {reason}")]
    LoginFailed { reason: String },

    /// A write action completed the round trip but reported a non-success
    /// result.
    #[error("{action} failed: {detail}")]
    ActionFailed {
        action: &'static str,
        detail: String,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

/// Terminal API error: the server's `error.code` / `error.info` pair plus the
/// full response and the full outgoing request for diagnostics.
#[derive(Debug, Error)]
#[error("API error [{code}]: {info}")]
pub struct ApiError {
    pub code: String,
    pub info: String,
    pub response: Value,
    pub request: Vec<(String, String)>,
}

impl Error {
    /// The machine-readable error code, when one exists.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Api(error) => Some(&error.code),
            Self::BatchLimit { code, .. } => Some(code),
            _ => None,
        }
    }

    /// The human-readable description the server attached, when one exists.
    pub fn info(&self) -> Option<&str> {
        match self {
            Self::Api(error) => Some(&error.info),
            _ => None,
        }
    }
}
