//! Plinth CLI library
//!
//! Command definitions and dispatch. Each workload's topology lives in
//! one JSON state file under the state directory, named after its
//! identity.

#![deny(missing_docs)]

pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use plinth_common::Result;

/// Provision static websites and containerized services from declarative
/// workload specs
#[derive(Debug, Parser)]
#[command(name = "plinth", version, about)]
pub struct Cli {
    /// Directory holding one state file per workload
    #[arg(long, global = true, default_value = "./plinth-state")]
    pub state_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

/// Top-level subcommands
#[derive(Debug, Subcommand)]
enum Command {
    /// Provision (or reconcile) a workload from a spec file
    Provision {
        /// Path to the workload spec (YAML or JSON)
        #[arg(long)]
        spec: PathBuf,
        /// Failure domains each subnet tier spreads across
        #[arg(long, default_value_t = 2)]
        zones: usize,
        /// Emit the descriptor as JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Show the recorded resources of a workload
    Describe {
        /// Workload identity
        identity: String,
    },
    /// List recorded workloads in the state directory
    List,
    /// Tear down a workload's recorded topology
    Decommission {
        /// Workload identity
        identity: String,
        /// Disable deletion protection on protected resources
        #[arg(long)]
        force: bool,
    },
}

impl Cli {
    /// Execute the selected subcommand
    pub async fn run(&self) -> Result<()> {
        match &self.command {
            Command::Provision { spec, zones, json } => {
                commands::provision::run(&self.state_dir, spec, *zones, *json).await
            }
            Command::Describe { identity } => {
                commands::describe::run(&self.state_dir, identity).await
            }
            Command::List => commands::list::run(&self.state_dir).await,
            Command::Decommission { identity, force } => {
                commands::decommission::run(&self.state_dir, identity, *force).await
            }
        }
    }
}

/// State file path for one workload identity
pub(crate) fn state_file(state_dir: &std::path::Path, identity: &str) -> PathBuf {
    state_dir.join(format!("{identity}.json"))
}
