//! `cache-pirate`: co-run a target process with one or more cache-occupying
//! pirate threads and sample the target's hardware performance counters as
//! a function of how much shared last-level cache the pirates leave it.

mod bootstrap;
mod buffer;
mod cli;
mod coordinator;
mod counter_group;
mod cpu;
mod error;
mod events;
mod pirate;
mod sink;
mod state;
mod target;
mod topology;

use clap::Parser;

use crate::cli::Cli;
use crate::events::SymbolTableResolver;
use crate::topology::SysfsTopology;

/// Exit code used for any failure that isn't the target's own exit status.
const FAILURE: i32 = 1;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let resolver = SymbolTableResolver;

    let settings = match cli.into_settings(&resolver) {
        Ok(settings) => settings,
        Err(err) => {
            tracing::error!(%err, "invalid configuration");
            std::process::exit(FAILURE);
        }
    };

    let topology = SysfsTopology;
    match bootstrap::run(settings, &topology) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            tracing::error!(%err, "cache-pirate run failed");
            std::process::exit(FAILURE);
        }
    }
}
