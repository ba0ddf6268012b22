//! Provisioning error types.

use std::time::Duration;

use thiserror::Error;

use dwh_cloud::CloudError;
use dwh_core::{ConfigError, Phase};

use crate::orchestrator::Stage;

/// Role and policy failures.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("failed to create role {role}")]
    CreateRole {
        role: String,
        #[source]
        source: CloudError,
    },

    #[error("failed to attach policy {policy} to role {role}")]
    AttachPolicy {
        role: String,
        policy: String,
        #[source]
        source: CloudError,
    },

    #[error("failed to resolve ARN of role {role}")]
    ResolveArn {
        role: String,
        #[source]
        source: CloudError,
    },

    #[error("failed to detach policy {policy} from role {role}")]
    DetachPolicy {
        role: String,
        policy: String,
        #[source]
        source: CloudError,
    },

    #[error("failed to delete role {role}")]
    DeleteRole {
        role: String,
        #[source]
        source: CloudError,
    },
}

/// Cluster create/delete requests rejected by the control plane.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("create request for cluster {cluster} rejected")]
    Launch {
        cluster: String,
        #[source]
        source: CloudError,
    },

    #[error("delete request for cluster {cluster} rejected")]
    Terminate {
        cluster: String,
        #[source]
        source: CloudError,
    },
}

/// Readiness wait failures.
#[derive(Debug, Error)]
pub enum PollError {
    #[error(
        "timed out after {elapsed:?} waiting for cluster {cluster} ({attempts} polls, last status `{last_status}`)"
    )]
    Timeout {
        cluster: String,
        elapsed: Duration,
        attempts: u32,
        last_status: String,
    },

    #[error("cluster {cluster} reported unexpected status `{status}` after {attempts} polls")]
    Failed {
        cluster: String,
        status: String,
        attempts: u32,
    },

    #[error("describe of cluster {cluster} failed on poll {attempts}")]
    Describe {
        cluster: String,
        attempts: u32,
        #[source]
        source: CloudError,
    },

    #[error("wait for cluster {cluster} cancelled after {attempts} polls")]
    Cancelled { cluster: String, attempts: u32 },
}

/// Ingress authorization failures.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("cluster {cluster} reported no VPC")]
    MissingVpc { cluster: String },

    #[error("failed to find the default security group of {vpc}")]
    Lookup {
        vpc: String,
        #[source]
        source: CloudError,
    },

    #[error("failed to open port {port} on security group {group}")]
    Authorize {
        group: String,
        port: u16,
        #[source]
        source: CloudError,
    },
}

/// Durable write failures.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to load {path}")]
    Load {
        path: String,
        #[source]
        source: ConfigError,
    },

    #[error("failed to update {path} after {attempts} attempts")]
    Write {
        path: String,
        attempts: u32,
        #[source]
        source: ConfigError,
    },

    #[error("cluster {cluster} is available but reported no endpoint")]
    MissingEndpoint { cluster: String },
}

/// The component failure that halted a run.
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Provision(#[from] ProvisionError),

    #[error(transparent)]
    Poll(#[from] PollError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// A halted run: which phase, which cluster, and the stage it stopped in.
#[derive(Debug, Error)]
#[error("{phase} of cluster {cluster} halted while {stage}")]
pub struct OrchestratorError {
    pub phase: Phase,
    pub cluster: String,
    pub stage: Stage,
    #[source]
    pub source: StageError,
}

pub type ProvisionResult<T> = Result<T, OrchestratorError>;
