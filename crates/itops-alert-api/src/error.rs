use thiserror::Error;

/// Top-level error type for the `itops-alert-api` crate.
///
/// Covers every failure mode across the outbound surfaces: transport,
/// the document store, the object directory, and the RCA service.
/// `itops-alert-core` maps these into transient / permanent I/O errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS setup or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Authorization header could not be built from the configured token.
    #[error("Invalid authorization header: {0}")]
    InvalidAuthorization(String),

    // ── Document store ──────────────────────────────────────────────
    /// Structured error from the search index
    /// (parsed from the `{error: {type, reason}, status}` envelope).
    #[error("Search API error (HTTP {status}) {kind}: {reason}")]
    Search {
        status: u16,
        kind: String,
        reason: String,
    },

    /// Bulk-style request where some items failed.
    #[error("Search index rejected {failed} of {total} items: {first_reason}")]
    PartialFailure {
        failed: usize,
        total: usize,
        first_reason: String,
    },

    // ── Object directory ────────────────────────────────────────────
    /// Non-success response from the ontology manager / query service.
    #[error("Directory API error (HTTP {status}): {message}")]
    Directory { status: u16, message: String },

    // ── RCA service ─────────────────────────────────────────────────
    /// Non-success response from the external RCA service.
    #[error("RCA API error (HTTP {status}): {message}")]
    Rca { status: u16, message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|s| s.is_server_error())
            }
            Self::Timeout { .. } => true,
            Self::Search { status, .. }
            | Self::Directory { status, .. }
            | Self::Rca { status, .. } => is_retryable_status(*status),
            Self::PartialFailure { .. } => true,
            _ => false,
        }
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            Self::Search { status: 404, .. }
            | Self::Directory { status: 404, .. }
            | Self::Rca { status: 404, .. } => true,
            _ => false,
        }
    }

    /// HTTP status code carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            Self::Search { status, .. }
            | Self::Directory { status, .. }
            | Self::Rca { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// 408, 429 and every 5xx are worth another attempt.
fn is_retryable_status(status: u16) -> bool {
    status == 408 || status == 429 || (500..600).contains(&status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_transient() {
        let err = Error::Search {
            status: 503,
            kind: "unavailable_shards_exception".into(),
            reason: "primary shard is not active".into(),
        };
        assert!(err.is_transient());
        assert_eq!(err.status(), Some(503));
    }

    #[test]
    fn client_errors_are_permanent() {
        let err = Error::Search {
            status: 400,
            kind: "parsing_exception".into(),
            reason: "unknown query [bogus]".into(),
        };
        assert!(!err.is_transient());
        assert!(!err.is_not_found());
    }

    #[test]
    fn rate_limit_is_transient() {
        let err = Error::Rca {
            status: 429,
            message: "slow down".into(),
        };
        assert!(err.is_transient());
    }

    #[test]
    fn not_found_is_detected_per_surface() {
        let err = Error::Directory {
            status: 404,
            message: "knowledge network missing".into(),
        };
        assert!(err.is_not_found());
        assert!(!err.is_transient());
    }

    #[test]
    fn deserialization_is_permanent() {
        let err = Error::Deserialization {
            message: "expected value".into(),
            body: "<html>".into(),
        };
        assert!(!err.is_transient());
        assert_eq!(err.status(), None);
    }
}
