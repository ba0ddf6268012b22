//! ETL steps over a `SqlExecutor`.

use std::fmt;
use std::str::FromStr;

use tracing::{error, info};

use dwh_core::config::ConnectionConfig;
use dwh_core::{DwhConfig, is_sentinel};

use crate::error::{EtlError, EtlResult};
use crate::executor::SqlExecutor;
use crate::queries::{self, CopySource, Statement};

/// What a `dwh-etl` invocation does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EtlStep {
    /// Drop and recreate every table.
    Reset,
    /// Stage from S3, then fill the star schema.
    Load,
    /// Reset followed by load.
    All,
}

impl EtlStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            EtlStep::Reset => "reset",
            EtlStep::Load => "load",
            EtlStep::All => "all",
        }
    }
}

impl fmt::Display for EtlStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EtlStep {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reset" => Ok(EtlStep::Reset),
            "load" => Ok(EtlStep::Load),
            "all" => Ok(EtlStep::All),
            other => Err(format!("unknown step `{other}` (expected reset, load, or all)")),
        }
    }
}

/// Connection and COPY settings, taken from a file `create` has published to.
#[derive(Debug, Clone)]
pub struct EtlTarget {
    pub connection: ConnectionConfig,
    pub source: CopySource,
}

impl EtlTarget {
    /// Refuses a configuration whose endpoint or role ARN is still the
    /// sentinel or blank.
    pub fn from_config(config: &DwhConfig) -> EtlResult<Self> {
        if is_sentinel(&config.cluster.host) {
            return Err(EtlError::EndpointUnset {
                section: "cluster",
                key: "host",
            });
        }
        if is_sentinel(&config.iam_role.arn) {
            return Err(EtlError::EndpointUnset {
                section: "iam_role",
                key: "arn",
            });
        }
        let s3 = config.s3.as_ref().ok_or(EtlError::MissingSource)?;

        Ok(Self {
            connection: config.cluster.clone(),
            source: CopySource::new(s3, &config.iam_role.arn, &config.aws.region),
        })
    }
}

/// Execute `statements` in order, stopping at the first failure.
async fn execute_all(executor: &dyn SqlExecutor, step: &str, statements: &[Statement]) -> EtlResult<()> {
    for statement in statements {
        match executor.execute(statement).await {
            Ok(rows) => info!(step, statement = %statement.label, rows, "statement done"),
            Err(e) => {
                error!(step, statement = %statement.label, error = %e, "statement failed");
                return Err(e);
            }
        }
    }
    Ok(())
}

pub async fn reset_tables(executor: &dyn SqlExecutor) -> EtlResult<()> {
    execute_all(executor, "drop", &queries::drop_statements()).await?;
    execute_all(executor, "create", &queries::create_statements()).await
}

pub async fn load_staging_tables(executor: &dyn SqlExecutor, source: &CopySource) -> EtlResult<()> {
    execute_all(executor, "copy", &source.copy_statements()).await
}

pub async fn insert_tables(executor: &dyn SqlExecutor) -> EtlResult<()> {
    execute_all(executor, "insert", &queries::insert_statements()).await
}

pub async fn run(executor: &dyn SqlExecutor, step: EtlStep, target: &EtlTarget) -> EtlResult<()> {
    info!(%step, host = %target.connection.host, "etl started");
    if matches!(step, EtlStep::Reset | EtlStep::All) {
        reset_tables(executor).await?;
    }
    if matches!(step, EtlStep::Load | EtlStep::All) {
        load_staging_tables(executor, &target.source).await?;
        insert_tables(executor).await?;
    }
    info!(%step, "etl finished");
    Ok(())
}
