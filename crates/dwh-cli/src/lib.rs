//! dwh-cli: command-line front ends for the warehouse lifecycle.
//!
//! `dwhctl <create|delete>` runs one provisioning phase; `dwh-etl
//! <reset|load|all>` runs the load once `create` has published the endpoint.

pub mod cli;
pub mod commands;

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,dwhctl=debug,dwh=debug";

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
