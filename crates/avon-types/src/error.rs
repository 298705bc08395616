use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::interface::InterfaceKind;
use crate::operation::Operation;

/// Global error type for registration, dispatch and server lifecycle.
///
/// Registration-phase variants are returned to the caller performing the
/// registration.  Serving-phase variants become a per-request failure
/// response and never stop the event loop.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "error", content = "details", rename_all = "snake_case")]
pub enum AvonError {
    // ── Registration phase ───────────────────────────────────────────────
    #[error("model '{name}' is already registered")]
    DuplicateName { name: String },

    #[error("parent model '{parent}' of '{name}' is not registered")]
    UnknownParent { name: String, parent: String },

    #[error("invalid interface '{0}'")]
    InvalidInterface(String),

    #[error("invalid model name '{0}'")]
    InvalidName(String),

    #[error("registration is closed once the server is serving")]
    RegistrationClosed,

    // ── Serving phase ────────────────────────────────────────────────────
    #[error("unknown model '{0}'")]
    UnknownModel(String),

    #[error("no {interface} capability installed for {operation}")]
    CapabilityNotInstalled {
        interface: InterfaceKind,
        operation: Operation,
    },

    #[error("model '{model}' is a {registered} model, not {requested}")]
    InterfaceMismatch {
        model: String,
        registered: InterfaceKind,
        requested: InterfaceKind,
    },

    #[error("{what} count {count} exceeds the maximum of {max}")]
    OutOfBounds {
        what: String,
        count: usize,
        max: usize,
    },

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("backend failure on '{model}' during {operation}: {details}")]
    BackendFailure {
        model: String,
        operation: Operation,
        details: String,
    },

    // ── Lifecycle ────────────────────────────────────────────────────────
    #[error("init error: {0}")]
    Init(String),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Failure reported by a backend callback.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The handler does not implement this operation.
    #[error("operation not supported by this backend")]
    Unsupported,

    #[error("{0}")]
    Failed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_serializes_with_tag() {
        let err = AvonError::UnknownModel("laser9".to_string());
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"error\":\"unknown_model\""));
        let back: AvonError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
    }

    #[test]
    fn backend_failure_display_carries_context() {
        let err = AvonError::BackendFailure {
            model: "robot0".to_string(),
            operation: Operation::SetPva,
            details: "motor fault".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("robot0"));
        assert!(msg.contains("setPva"));
        assert!(msg.contains("motor fault"));
    }
}
