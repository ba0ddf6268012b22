//! dwh-etl: reset tables and load the datasets.

use clap::Parser;

use dwh_cli::cli::EtlArgs;
use dwh_cli::commands;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = EtlArgs::parse();
    dwh_cli::init_tracing(args.log_json);
    commands::etl::run(&args).await
}
