// ── Tracing setup ──
//
// One global subscriber: `EnvFilter` (RUST_LOG, else -v, else
// `log.level`) plus a text or JSON `fmt` layer writing to stdout or to a
// daily rolling file.

use std::ffi::OsStr;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use itops_alert_config::{LogConfig, LogFormat};

const DEFAULT_LOG_FILE: &str = "itops-alert.log";

/// Filter directive used when `RUST_LOG` is unset.
pub fn filter_directive(config: &LogConfig, verbosity: u8) -> String {
    match verbosity {
        0 => config.level.clone(),
        1 => "debug".into(),
        _ => "trace".into(),
    }
}

/// Install the global subscriber. The returned guard flushes the file
/// writer on drop and must live as long as the process.
pub fn init(config: &LogConfig, verbosity: u8) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(config, verbosity)));

    let (writer, guard, ansi) = match &config.filepath {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let file_name = path.file_name().unwrap_or(OsStr::new(DEFAULT_LOG_FILE));
            let appender = tracing_appender::rolling::daily(dir, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            (BoxMakeWriter::new(non_blocking), Some(guard), false)
        }
        None => (BoxMakeWriter::new(std::io::stdout), None, true),
    };

    let registry = tracing_subscriber::registry().with(filter);
    match config.format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(writer).with_current_span(true))
            .init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(writer).with_ansi(ansi).with_target(true))
            .init(),
    }
    guard
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_overrides_configured_level() {
        let config = LogConfig {
            level: "warn,itops_alert_core=info".into(),
            ..LogConfig::default()
        };
        assert_eq!(filter_directive(&config, 0), "warn,itops_alert_core=info");
        assert_eq!(filter_directive(&config, 1), "debug");
        assert_eq!(filter_directive(&config, 3), "trace");
    }
}
