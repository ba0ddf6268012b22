//! `dwh-etl <reset|load|all>`

use anyhow::Context;
use tracing::info;

use dwh_core::DwhConfig;
use dwh_etl::{EtlStep, EtlTarget, PgExecutor};

use crate::cli::EtlArgs;

pub async fn run(args: &EtlArgs) -> anyhow::Result<()> {
    let step = EtlStep::from(args.step);
    let config = DwhConfig::from_file(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    let target = EtlTarget::from_config(&config)?;

    let executor = PgExecutor::connect(&target.connection).await?;
    info!(%step, host = %target.connection.host, db = %target.connection.db_name, "connected");

    let result = dwh_etl::run(&executor, step, &target).await;
    executor.close().await;
    result?;

    println!("{step} complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::StepArg;

    #[tokio::test]
    async fn unpublished_endpoint_is_refused_before_connecting() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dwh.toml");
        std::fs::write(
            &path,
            r#"
[dwh]
cluster_type = "single-node"
num_nodes = 1
node_type = "small"
cluster_identifier = "c"
db = "dwh"
db_user = "u"
db_password = "p"
iam_role_name = "r"

[cluster]
host = "None"
"#,
        )
        .unwrap();

        let args = EtlArgs {
            step: StepArg::All,
            config: path,
            log_json: false,
        };
        let err = run(&args).await.unwrap_err();
        assert!(err.to_string().contains("dwhctl create"));
    }
}
