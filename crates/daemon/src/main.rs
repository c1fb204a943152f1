// SPDX-License-Identifier: MIT

//! dynamo-daemon: the action scheduler and inventory commit pipeline binary
//! (spec §4.5, §4.9).

mod config;
mod signals;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use config::DaemonConfig;
use dynamo_auth::InMemoryAuthorizationTable;
use dynamo_core::SystemClock;
use dynamo_inventory::{InMemoryInventoryStore, Inventory};
use dynamo_registry::InMemoryActionRegistry;
use dynamo_scheduler::Scheduler;
use dynamo_worker::UnixChildSpawner;

#[derive(Parser, Debug)]
#[command(name = "dynamod", version, about = "Dynamo action scheduler daemon")]
struct Cli {
    /// Path to a TOML configuration file; defaults to a platform search path.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    let config = match DaemonConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("dynamod: invalid configuration: {e}");
            std::process::exit(2);
        }
    };

    init_tracing(&config.log_filter);

    if let Err(e) = signals::install() {
        tracing::error!(error = %e, "failed to install signal handlers");
        std::process::exit(1);
    }

    let registry = Arc::new(InMemoryActionRegistry::new());
    let store = Arc::new(InMemoryInventoryStore::new());
    let inventory = Arc::new(Inventory::new(store, config.file_set_cache_capacity));
    if let Err(e) = inventory.load() {
        tracing::error!(error = %e, "failed to load inventory");
        std::process::exit(1);
    }
    let auth = Arc::new(InMemoryAuthorizationTable::new());
    let spawner = Arc::new(UnixChildSpawner::new());
    let clock = SystemClock;

    let mut scheduler = Scheduler::new(registry, inventory, auth, spawner, clock, config.scheduler);

    tracing::info!("dynamod starting");
    match scheduler.run(signals::shutdown_requested) {
        Ok(()) => {
            tracing::info!("dynamod shut down cleanly");
        }
        Err(e) => {
            tracing::error!(error = %e, "fatal scheduler loop error");
            std::process::exit(1);
        }
    }
}

fn init_tracing(filter: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter.to_string()));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}
