//! Service error types with miette diagnostics.
//!
//! Every failure that ends the process surfaces here with help text and
//! an exit code per error class.

use miette::Diagnostic;
use thiserror::Error;

use itops_alert_config::ConfigError;
use itops_alert_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL: i32 = 1;
    pub const CONFIG: i32 = 2;
    pub const STARTUP: i32 = 3;
    pub const RUNTIME: i32 = 4;
}

#[derive(Debug, Error, Diagnostic)]
pub enum AppError {
    // ── Configuration ────────────────────────────────────────────────
    #[error("Invalid configuration in {path}")]
    #[diagnostic(
        code(itops_alert::config),
        help(
            "Fix the file, the data/app_config.yaml side file or the ITOPS_* \
             environment overrides.\n\
             Try: itops-alert --config {path} --check-config"
        )
    )]
    Config {
        path: String,
        #[source]
        source: ConfigError,
    },

    #[error("The {backend} backend is not compiled into this binary")]
    #[diagnostic(
        code(itops_alert::feature_disabled),
        help("Rebuild with `--features {backend}` or pick the memory backend.")
    )]
    FeatureDisabled { backend: &'static str },

    // ── Startup ──────────────────────────────────────────────────────
    #[error("Cannot set up {component}")]
    #[diagnostic(
        code(itops_alert::startup),
        help("Check the platform and dependent service settings in the config file.")
    )]
    Startup {
        component: &'static str,
        #[source]
        source: CoreError,
    },

    #[error("Cannot listen on {addr}")]
    #[diagnostic(
        code(itops_alert::bind),
        help("Another process may hold the port. Change api.host or api.port.")
    )]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    // ── Runtime ──────────────────────────────────────────────────────
    #[error("{subsystem} stopped with an error")]
    #[diagnostic(code(itops_alert::subsystem))]
    Subsystem {
        subsystem: &'static str,
        #[source]
        source: CoreError,
    },

    #[error("HTTP server failed")]
    #[diagnostic(code(itops_alert::serve))]
    Serve(#[source] std::io::Error),
}

impl AppError {
    pub fn startup(component: &'static str, source: impl Into<CoreError>) -> Self {
        Self::Startup {
            component,
            source: source.into(),
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config { .. } | Self::FeatureDisabled { .. } => exit_code::CONFIG,
            Self::Startup { .. } | Self::Bind { .. } => exit_code::STARTUP,
            Self::Subsystem { .. } | Self::Serve(_) => exit_code::RUNTIME,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_exit_with_usage_code() {
        let err = AppError::Config {
            path: "config/config.yaml".into(),
            source: ConfigError::Validation {
                field: "api.port".into(),
                reason: "must not be 0".into(),
            },
        };
        assert_eq!(err.exit_code(), exit_code::CONFIG);
        assert_ne!(err.exit_code(), exit_code::SUCCESS);

        let report = format!("{:?}", miette::Report::new(err));
        assert!(report.contains("--check-config"), "{report}");
    }

    #[test]
    fn runtime_failures_are_distinct() {
        let err = AppError::Subsystem {
            subsystem: "correlation",
            source: CoreError::Cancelled,
        };
        assert_eq!(err.exit_code(), exit_code::RUNTIME);
        assert_eq!(
            AppError::startup("search index client", CoreError::Internal("x".into())).exit_code(),
            exit_code::STARTUP
        );
    }
}
