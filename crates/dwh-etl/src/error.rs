//! ETL error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EtlError {
    /// `create` has not published an endpoint, or `delete` has cleared it.
    #[error("[{section}].{key} is unset; run `dwhctl create` first")]
    EndpointUnset {
        section: &'static str,
        key: &'static str,
    },

    #[error("missing [s3] section")]
    MissingSource,

    #[error("failed to connect to {host}:{port}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: sqlx::Error,
    },

    #[error("statement `{statement}` failed")]
    Statement {
        statement: String,
        #[source]
        source: sqlx::Error,
    },
}

pub type EtlResult<T> = Result<T, EtlError>;
