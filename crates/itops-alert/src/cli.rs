//! Clap derive structures for the `itops-alert` binary.

use std::path::PathBuf;

use clap::{ArgAction, Parser};

use itops_alert_config::DEFAULT_CONFIG_PATH;

/// itops-alert -- correlate monitoring alerts into fault points and problems
#[derive(Debug, Parser)]
#[command(
    name = "itops-alert",
    version,
    about = "Correlate monitoring alerts into fault points and problems",
    long_about = "Ingests webhook alerts, collapses repeats into fault points, groups\n\
        correlated fault points into problems and hands them to the external\n\
        root-cause analyzer."
)]
pub struct Cli {
    /// Main configuration file
    #[arg(long, short = 'c', default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(long, short = 'v', action = ArgAction::Count)]
    pub verbose: u8,

    /// Load and validate configuration, print the listen address and exit
    #[arg(long)]
    pub check_config: bool,
}
