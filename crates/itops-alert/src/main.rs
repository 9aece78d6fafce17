use std::sync::Arc;

use clap::Parser;

use itops_alert::cli::Cli;
use itops_alert::error::AppError;
use itops_alert::{supervisor, telemetry};
use itops_alert_config::ConfigManager;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let manager = ConfigManager::load(&cli.config).map_err(|source| AppError::Config {
        path: cli.config.display().to_string(),
        source,
    })?;
    let config = manager.current();

    if cli.check_config {
        println!(
            "configuration OK: {} (listening on {})",
            cli.config.display(),
            config.api.listen_addr()
        );
        return Ok(());
    }

    let _guard = telemetry::init(&config.log, cli.verbose);
    tracing::info!(
        config = %cli.config.display(),
        storage = %config.storage.backend,
        broker = %config.broker.backend,
        "starting itops-alert"
    );
    supervisor::run(Arc::new(manager)).await
}
