//! Argument definitions shared by both binaries.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use dwh_core::Phase;
use dwh_etl::EtlStep;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PhaseArg {
    /// Role, cluster, ingress rule, then publish the endpoint.
    Create,
    /// Cluster, then role, then clear the endpoint.
    Delete,
}

impl From<PhaseArg> for Phase {
    fn from(arg: PhaseArg) -> Self {
        match arg {
            PhaseArg::Create => Phase::Create,
            PhaseArg::Delete => Phase::Delete,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// IAM, Redshift, and EC2 through the AWS SDK.
    Aws,
    /// In-process simulated control plane. The endpoint it publishes is fictional.
    Memory,
}

#[derive(Debug, Parser)]
#[command(
    name = "dwhctl",
    about = "Create or delete the warehouse cluster",
    version
)]
pub struct DwhctlArgs {
    /// Lifecycle phase to run.
    #[arg(value_enum)]
    pub phase: PhaseArg,

    /// Configuration file; the endpoint is published back into it.
    #[arg(short, long, default_value = "dwh.toml")]
    pub config: PathBuf,

    /// Control plane to talk to.
    #[arg(long, value_enum, default_value_t = Backend::Aws)]
    pub backend: Backend,

    /// Emit logs as JSON lines.
    #[arg(long)]
    pub log_json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StepArg {
    /// Drop and recreate every table.
    Reset,
    /// COPY staging tables from S3, then insert into the star schema.
    Load,
    /// Reset, then load.
    All,
}

impl From<StepArg> for EtlStep {
    fn from(arg: StepArg) -> Self {
        match arg {
            StepArg::Reset => EtlStep::Reset,
            StepArg::Load => EtlStep::Load,
            StepArg::All => EtlStep::All,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "dwh-etl",
    about = "Load the event and song datasets into the warehouse",
    version
)]
pub struct EtlArgs {
    #[arg(value_enum)]
    pub step: StepArg,

    /// Configuration file written by `dwhctl create`.
    #[arg(short, long, default_value = "dwh.toml")]
    pub config: PathBuf,

    /// Emit logs as JSON lines.
    #[arg(long)]
    pub log_json: bool,
}
