//! dwhctl: create or delete the warehouse cluster.
//!
//! ```text
//! dwhctl create [--config dwh.toml] [--backend aws|memory]
//! dwhctl delete
//! ```

use clap::Parser;

use dwh_cli::cli::DwhctlArgs;
use dwh_cli::commands;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = DwhctlArgs::parse();
    dwh_cli::init_tracing(args.log_json);
    commands::provision::run(&args).await
}
