//! Shared types used across dwhgrid crates.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Value written to `[cluster].host` and `[iam_role].arn` while no cluster exists.
pub const UNSET_SENTINEL: &str = "None";

/// Managed policy granting the cluster read access to the source buckets.
pub const S3_READ_ONLY_POLICY_ARN: &str = "arn:aws:iam::aws:policy/AmazonS3ReadOnlyAccess";

/// Service principal allowed to assume the warehouse role.
pub const CLUSTER_SERVICE_PRINCIPAL: &str = "redshift.amazonaws.com";

/// Largest node count a multi-node cluster may request.
pub const MAX_NODES: u32 = 128;

// ── Cluster spec ───────────────────────────────────────────────────

/// Hardware class of the warehouse cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClusterClass {
    SingleNode,
    MultiNode,
}

impl ClusterClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterClass::SingleNode => "single-node",
            ClusterClass::MultiNode => "multi-node",
        }
    }
}

/// Desired state of the warehouse cluster. Built once at startup, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterSpec {
    pub identifier: String,
    pub node_type: String,
    pub node_count: u32,
    pub class: ClusterClass,
    pub db_name: String,
    pub master_user: String,
    pub master_password: String,
    pub port: u16,
}

impl ClusterSpec {
    /// Check the spec for values the control plane would reject outright.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.identifier.trim().is_empty() {
            return Err(ConfigError::Invalid("cluster identifier must not be empty".into()));
        }
        if self.node_type.trim().is_empty() {
            return Err(ConfigError::Invalid("node type must not be empty".into()));
        }
        if self.node_count == 0 {
            return Err(ConfigError::Invalid("node count must be at least 1".into()));
        }
        if self.node_count > MAX_NODES {
            return Err(ConfigError::Invalid(format!(
                "node count {} exceeds the limit of {MAX_NODES}",
                self.node_count
            )));
        }
        if self.class == ClusterClass::SingleNode && self.node_count != 1 {
            return Err(ConfigError::Invalid(format!(
                "single-node cluster cannot have {} nodes",
                self.node_count
            )));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid("port must be non-zero".into()));
        }
        if self.db_name.is_empty() || self.master_user.is_empty() {
            return Err(ConfigError::Invalid(
                "database name and master user are required".into(),
            ));
        }
        Ok(())
    }
}

// ── Identity ───────────────────────────────────────────────────────

/// The trust role the cluster assumes to read from object storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityDescriptor {
    pub role_name: String,
    pub description: String,
    pub trust_policy: String,
    pub policy_arn: String,
}

impl IdentityDescriptor {
    /// Role trusted by the warehouse service with the S3 read-only policy attached.
    pub fn for_cluster_service(role_name: &str) -> Self {
        let trust_policy = serde_json::json!({
            "Statement": [{
                "Action": "sts:AssumeRole",
                "Effect": "Allow",
                "Principal": { "Service": CLUSTER_SERVICE_PRINCIPAL },
            }],
            "Version": "2012-10-17",
        });
        Self {
            role_name: role_name.to_string(),
            description: "Allows Redshift clusters to call AWS services on your behalf.".to_string(),
            trust_policy: trust_policy.to_string(),
            policy_arn: S3_READ_ONLY_POLICY_ARN.to_string(),
        }
    }
}

// ── Cluster state ──────────────────────────────────────────────────

/// Status reported by the cluster-management API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterStatus {
    Creating,
    Available,
    Deleting,
    Absent,
    Failed,
    /// Anything else the control plane reports (e.g. `modifying`).
    Other(String),
}

impl ClusterStatus {
    /// Map a raw control-plane status string.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "creating" => ClusterStatus::Creating,
            "available" => ClusterStatus::Available,
            "deleting" => ClusterStatus::Deleting,
            "absent" => ClusterStatus::Absent,
            "failed" | "incompatible-parameters" | "incompatible-network" => {
                ClusterStatus::Failed
            }
            other => ClusterStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ClusterStatus::Creating => "creating",
            ClusterStatus::Available => "available",
            ClusterStatus::Deleting => "deleting",
            ClusterStatus::Absent => "absent",
            ClusterStatus::Failed => "failed",
            ClusterStatus::Other(raw) => raw,
        }
    }
}

impl fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection address of an available cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub address: String,
    pub port: u16,
}

/// Snapshot of the cluster as last described by the control plane.
///
/// Owned by the cloud, not by us: it is re-fetched on every poll and
/// discarded when the run ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterState {
    pub identifier: String,
    pub status: ClusterStatus,
    pub vpc_id: Option<String>,
    /// Present only once the cluster is `available`.
    pub endpoint: Option<Endpoint>,
    pub role_arn: Option<String>,
}

// ── Persisted endpoint ─────────────────────────────────────────────

/// Connection handoff written for the ETL stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedEndpoint {
    pub host: String,
    pub role_arn: String,
}

impl PersistedEndpoint {
    pub fn new(host: impl Into<String>, role_arn: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            role_arn: role_arn.into(),
        }
    }

    /// Both fields at the sentinel value.
    pub fn unset() -> Self {
        Self::new(UNSET_SENTINEL, UNSET_SENTINEL)
    }

    /// True when either field still holds the sentinel (or nothing at all).
    pub fn is_unset(&self) -> bool {
        is_sentinel(&self.host) || is_sentinel(&self.role_arn)
    }
}

/// True for the sentinel, and for a blank value.
pub fn is_sentinel(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || value == UNSET_SENTINEL
}

// ── Phase ──────────────────────────────────────────────────────────

/// Which half of the lifecycle a run performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Create,
    Delete,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Create => "create",
            Phase::Delete => "delete",
        }
    }
}

impl std::str::FromStr for Phase {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Phase::Create),
            "delete" => Ok(Phase::Delete),
            other => Err(ConfigError::Invalid(format!(
                "unknown phase `{other}` (expected `create` or `delete`)"
            ))),
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
