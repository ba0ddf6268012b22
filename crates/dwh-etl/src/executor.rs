//! Statement execution against the warehouse.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use tracing::debug;

use dwh_core::config::ConnectionConfig;

use crate::error::{EtlError, EtlResult};
use crate::queries::Statement;

/// Runs one statement in its own transaction and commits it.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Returns the number of rows affected.
    async fn execute(&self, statement: &Statement) -> EtlResult<u64>;
}

/// Redshift speaks the Postgres wire protocol, so a plain sqlx pool works.
#[derive(Clone)]
pub struct PgExecutor {
    pool: PgPool,
}

impl PgExecutor {
    pub async fn connect(conn: &ConnectionConfig) -> EtlResult<Self> {
        let options = PgConnectOptions::new()
            .host(&conn.host)
            .port(conn.port)
            .username(&conn.db_user)
            .password(&conn.db_password)
            .database(&conn.db_name);

        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await
            .map_err(|source| EtlError::Connect {
                host: conn.host.clone(),
                port: conn.port,
                source,
            })?;

        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl SqlExecutor for PgExecutor {
    async fn execute(&self, statement: &Statement) -> EtlResult<u64> {
        let failed = |source: sqlx::Error| EtlError::Statement {
            statement: statement.label.clone(),
            source,
        };

        let mut tx = self.pool.begin().await.map_err(failed)?;
        let result = sqlx::query(&statement.sql)
            .execute(&mut *tx)
            .await
            .map_err(failed)?;
        tx.commit().await.map_err(failed)?;

        debug!(statement = %statement.label, rows = result.rows_affected(), "committed");
        Ok(result.rows_affected())
    }
}
