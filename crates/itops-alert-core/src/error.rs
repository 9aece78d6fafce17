// ── Core error types ──
//
// Errors surfaced by the correlation engines. Transport-level failures
// from `itops-alert-api` collapse into transient or permanent I/O so the
// ingest loop only has to ask one question: retry or skip.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── I/O ──────────────────────────────────────────────────────────
    /// Store, broker or HTTP failure that may succeed on retry.
    #[error("Transient I/O failure: {message}")]
    TransientIo { message: String },

    /// Rejected request or malformed response; retrying will not help.
    #[error("Permanent I/O failure: {message}")]
    PermanentIo { message: String },

    // ── Domain ───────────────────────────────────────────────────────
    /// An operation was attempted on an entity in the wrong state.
    #[error("Precondition violated: {message}")]
    PreconditionViolated { message: String },

    /// The object directory has no entry for the lookup key.
    #[error("Unknown entity: {key}")]
    EntityUnknown { key: String },

    #[error("Not found: {entity_type} {identifier}")]
    NotFound {
        entity_type: &'static str,
        identifier: String,
    },

    /// Wall clock went backwards relative to the last issued id.
    #[error("Clock moved backwards: last issued second {last}, now {now}")]
    ClockRegression { last: u64, now: u64 },

    /// Payload could not be turned into a raw event.
    #[error("Cannot normalize event: {message}")]
    Normalize { message: String },

    // ── Lifecycle ────────────────────────────────────────────────────
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Whether the failed unit of work should be retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientIo { .. })
    }

    pub(crate) fn not_found(entity_type: &'static str, identifier: impl ToString) -> Self {
        Self::NotFound {
            entity_type,
            identifier: identifier.to_string(),
        }
    }

    pub(crate) fn precondition(message: impl Into<String>) -> Self {
        Self::PreconditionViolated {
            message: message.into(),
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<itops_alert_api::Error> for CoreError {
    fn from(err: itops_alert_api::Error) -> Self {
        match err {
            itops_alert_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            itops_alert_api::Error::Tls(msg) => CoreError::Config {
                message: format!("TLS error: {msg}"),
            },
            itops_alert_api::Error::InvalidAuthorization(msg) => CoreError::Config {
                message: format!("Invalid authorization: {msg}"),
            },
            other if other.is_transient() => CoreError::TransientIo {
                message: other.to_string(),
            },
            other => CoreError::PermanentIo {
                message: other.to_string(),
            },
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Internal(format!("JSON encoding error: {err}"))
    }
}
