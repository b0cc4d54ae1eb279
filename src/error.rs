//! Error types for the orchestration core.
//!
//! [`ExceptionKind`] is the classification surface carried by every
//! [`Error::Provider`] event; the outcome determiner switches on it to decide
//! retry vs key-rotate vs failover.

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of a provider-originated failure. Carried by error events
/// coming out of the Provider Adapter so downstream components never need to
/// inspect transport-level error types directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionKind {
    ProviderUnreachable,
    AuthInvalid,
    PermissionDenied,
    RateLimited,
    BadRequest,
    Timeout,
    ConnectionReset,
    ApiStatus5xx,
    ApiStatus4xxOther,
    Unknown,
}

impl ExceptionKind {
    /// `true` for the fixed class of transport errors the provider adapter
    /// retries internally before surfacing an `error` event.
    pub fn is_provider_internal_retry(&self) -> bool {
        matches!(
            self,
            ExceptionKind::Timeout | ExceptionKind::ConnectionReset | ExceptionKind::ApiStatus5xx
        )
    }

    /// `true` if the outcome determiner should classify this as key-related
    /// (rotate/quarantine) rather than a plain retry.
    pub fn is_key_related(&self) -> bool {
        matches!(
            self,
            ExceptionKind::AuthInvalid | ExceptionKind::PermissionDenied | ExceptionKind::RateLimited
        )
    }

    /// `true` if the outcome determiner should classify this as provider-level
    /// (immediate failover, no retry).
    pub fn is_provider_level(&self) -> bool {
        matches!(self, ExceptionKind::ProviderUnreachable)
    }

    pub fn from_status_code(status: u16) -> Self {
        match status {
            401 => ExceptionKind::AuthInvalid,
            403 => ExceptionKind::PermissionDenied,
            429 => ExceptionKind::RateLimited,
            500 | 502 | 503 | 504 => ExceptionKind::ApiStatus5xx,
            400 => ExceptionKind::BadRequest,
            _ => ExceptionKind::ApiStatus4xxOther,
        }
    }
}

/// Main error type for the orchestration core.
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP transport error talking to a provider.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration (e.g. missing API key, malformed Settings).
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Provider-originated failure, classified for downstream routing.
    #[error("Provider error ({kind:?}): {message}")]
    Provider {
        kind: ExceptionKind,
        message: String,
    },

    /// Streaming transport error (SSE parse failure, connection drop mid-stream).
    #[error("Streaming error: {0}")]
    Stream(String),

    /// Referenced tool is not registered.
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Agent type is not authorized to call this tool.
    #[error("Agent type '{agent_type}' is not authorized to call tool '{tool}'")]
    ToolAuthorizationDenied { agent_type: String, tool: String },

    /// Tool argument was missing or malformed.
    #[error("Invalid argument for tool '{tool}': {message}")]
    ToolArgInvalid { tool: String, message: String },

    /// Requested state is not a legal transition from the agent's current state.
    #[error("Illegal state transition for agent '{agent_id}': '{from}' -> '{to}'")]
    StateIllegalTransition {
        agent_id: String,
        from: String,
        to: String,
    },

    /// A workflow fired but its type/state precondition was not satisfied.
    #[error("Workflow precondition failed for '{workflow}': {message}")]
    WorkflowPreconditionFailed { workflow: String, message: String },

    /// No agent exists with the given id.
    #[error("No such agent: {0}")]
    UnknownAgent(String),

    /// No model/provider candidate satisfied selection constraints.
    #[error("No available model candidate for agent '{0}'")]
    NoModelAvailable(String),

    /// Catch-all for conditions that don't fit the taxonomy above.
    #[error("Error: {0}")]
    Other(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub fn provider(kind: ExceptionKind, msg: impl Into<String>) -> Self {
        Error::Provider {
            kind,
            message: msg.into(),
        }
    }

    pub fn stream(msg: impl Into<String>) -> Self {
        Error::Stream(msg.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exception_kind_classification_buckets_are_disjoint() {
        let k = ExceptionKind::Timeout;
        assert!(k.is_provider_internal_retry());
        assert!(!k.is_key_related());
        assert!(!k.is_provider_level());

        let k = ExceptionKind::RateLimited;
        assert!(k.is_key_related());
        assert!(!k.is_provider_internal_retry());
    }

    #[test]
    fn from_status_code_maps_known_codes() {
        assert_eq!(ExceptionKind::from_status_code(401), ExceptionKind::AuthInvalid);
        assert_eq!(ExceptionKind::from_status_code(429), ExceptionKind::RateLimited);
        assert_eq!(ExceptionKind::from_status_code(503), ExceptionKind::ApiStatus5xx);
        assert_eq!(ExceptionKind::from_status_code(418), ExceptionKind::ApiStatus4xxOther);
    }

    #[test]
    fn error_provider_display() {
        let err = Error::provider(ExceptionKind::Timeout, "request timed out");
        assert!(err.to_string().contains("Timeout"));
        assert!(err.to_string().contains("request timed out"));
    }

    #[test]
    fn error_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
