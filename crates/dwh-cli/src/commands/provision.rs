//! `dwhctl <create|delete>`

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{info, warn};

use dwh_cloud::{CloudClients, SimulatedCloud};
use dwh_core::{DwhConfig, Phase};
use dwh_provision::Orchestrator;

use crate::cli::{Backend, DwhctlArgs};

pub async fn run(args: &DwhctlArgs) -> anyhow::Result<()> {
    let phase = Phase::from(args.phase);
    let config = DwhConfig::from_file(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    let clients = connect(args.backend, &config).await?;

    let mut orchestrator = Orchestrator::new(&config, &args.config, clients)
        .with_context(|| format!("invalid configuration in {}", args.config.display()))?
        .with_cancel(interrupt_signal());
    info!(%phase, cluster = %orchestrator.spec().identifier, backend = ?args.backend, "dwhctl starting");

    match orchestrator.run(phase).await? {
        Some(endpoint) => {
            println!("host: {}", endpoint.host);
            println!("role_arn: {}", endpoint.role_arn);
        }
        None => println!("cluster {} deleted", orchestrator.spec().identifier),
    }
    Ok(())
}

/// Build the clients for the chosen backend.
pub async fn connect(backend: Backend, config: &DwhConfig) -> anyhow::Result<CloudClients> {
    match backend {
        // Transient statuses resolve on the first describe so a dry run does not sit in sleeps.
        Backend::Memory => Ok(CloudClients::from_backend(Arc::new(
            SimulatedCloud::new()
                .with_region(&config.aws.region)
                .with_creating_polls(0)
                .with_deleting_polls(0),
        ))),
        #[cfg(feature = "aws")]
        Backend::Aws => {
            let cloud = dwh_cloud::AwsCloud::connect(&config.aws).await;
            Ok(CloudClients::from_backend(Arc::new(cloud)))
        }
        #[cfg(not(feature = "aws"))]
        Backend::Aws => anyhow::bail!(
            "this build has no AWS backend; rebuild without `--no-default-features` or pass `--backend memory`"
        ),
    }
}

/// Flips to `true` on Ctrl-C. The poller stops at its next check.
fn interrupt_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, abandoning the current wait");
            let _ = tx.send(true);
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::PhaseArg;
    use std::path::PathBuf;

    const CONFIG: &str = r#"
[dwh]
cluster_type = "single-node"
num_nodes = 1
node_type = "small"
cluster_identifier = "dry-run"
db = "dwh"
db_user = "dwhuser"
db_password = "Passw0rd"
iam_role_name = "dwhRole"

[cluster]
host = "None"

[iam_role]
arn = "None"
"#;

    fn args(phase: PhaseArg, config: PathBuf) -> DwhctlArgs {
        DwhctlArgs {
            phase,
            config,
            backend: Backend::Memory,
            log_json: false,
        }
    }

    #[tokio::test]
    async fn memory_backend_create_publishes_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dwh.toml");
        std::fs::write(&path, CONFIG).unwrap();

        run(&args(PhaseArg::Create, path.clone())).await.unwrap();

        let endpoint = DwhConfig::from_file(&path).unwrap().persisted_endpoint();
        assert_eq!(
            endpoint.host,
            "dry-run.csim0001.us-west-2.redshift.amazonaws.com"
        );
        assert_eq!(endpoint.role_arn, "arn:aws:iam::123456789012:role/dwhRole");
    }

    #[tokio::test]
    async fn missing_config_fails_before_any_cloud_call() {
        let dir = tempfile::tempdir().unwrap();
        let err = run(&args(PhaseArg::Create, dir.path().join("absent.toml")))
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("failed to load"));
    }

    #[cfg(not(feature = "aws"))]
    #[tokio::test]
    async fn aws_backend_requires_feature() {
        let config = DwhConfig::parse(CONFIG).unwrap();
        let err = connect(Backend::Aws, &config).await.err().unwrap();
        assert!(err.to_string().contains("--backend memory"));
    }
}
