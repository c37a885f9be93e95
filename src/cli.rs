use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::PathBuf,
};

use clap::{Args, Parser, Subcommand};
use log::LevelFilter;
use sanplan_api::constants::{DEFAULTS_PATH_DEFAULT, SWITCHES_PATH_DEFAULT};

use crate::SANPLAN_VERSION;

#[derive(Parser, Debug)]
#[clap(version = SANPLAN_VERSION)]
pub struct Cli {
    /// Logging verbosity [OFF, ERROR, WARN, INFO, DEBUG, TRACE]
    #[arg(global = true, short, long, default_value_t = LevelFilter::Info)]
    pub verbosity: LevelFilter,

    #[clap(subcommand)]
    pub command: Commands,
}

/// The three inputs every command resolves.
#[derive(Args, Debug, Clone)]
pub struct InputArgs {
    /// Path to the project document
    #[clap(index = 1)]
    pub project: PathBuf,

    /// Path to the site defaults table
    #[clap(long, default_value = DEFAULTS_PATH_DEFAULT)]
    pub defaults: PathBuf,

    /// Path to the known-switch registry
    #[clap(long, default_value = SWITCHES_PATH_DEFAULT)]
    pub switches: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve the project and report whether it is consistent
    Validate {
        #[clap(flatten)]
        inputs: InputArgs,
    },

    /// Resolve the project and print the resulting graph
    Resolve {
        #[clap(flatten)]
        inputs: InputArgs,

        /// Serialization format of the graph
        #[clap(short, long, default_value = "yaml")]
        format: OutputFormat,

        /// Path to save the resolved graph
        #[clap(short, long)]
        outfile: Option<PathBuf>,

        /// Path to save an eventual fatal error
        #[clap(short, long)]
        error: Option<PathBuf>,
    },
}

impl Commands {
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Validate { .. } => "validate",
            Commands::Resolve { .. } => "resolve",
        }
    }

    pub fn inputs(&self) -> &InputArgs {
        match self {
            Commands::Validate { inputs } | Commands::Resolve { inputs, .. } => inputs,
        }
    }
}

impl Display for Commands {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.name())
    }
}

#[derive(clap::ValueEnum, Copy, Clone, Debug, Eq, PartialEq, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
pub enum OutputFormat {
    Yaml,
    Json,
}
