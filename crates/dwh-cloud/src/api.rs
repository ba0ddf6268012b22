//! Control-plane traits and the tagged outcomes they return.

use std::sync::Arc;

use async_trait::async_trait;

use dwh_core::{ClusterSpec, ClusterState, IdentityDescriptor};

use crate::error::CloudResult;

/// Result of a create-style call that may race with an existing resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
}

/// Result of a delete-style call that may find nothing to delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

/// An inbound rule on a security group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngressRule {
    pub protocol: String,
    pub from_port: u16,
    pub to_port: u16,
    pub cidr: String,
}

impl IngressRule {
    /// TCP on a single port from any address.
    pub fn tcp_from_anywhere(port: u16) -> Self {
        Self {
            protocol: "tcp".to_string(),
            from_port: port,
            to_port: port,
            cidr: "0.0.0.0/0".to_string(),
        }
    }
}

/// Role and policy management.
#[async_trait]
pub trait IdentityApi: Send + Sync {
    async fn create_role(&self, identity: &IdentityDescriptor) -> CloudResult<CreateOutcome>;

    /// Attaching an already-attached policy succeeds.
    async fn attach_role_policy(&self, role_name: &str, policy_arn: &str) -> CloudResult<()>;

    async fn role_arn(&self, role_name: &str) -> CloudResult<String>;

    /// `NotFound` when the role is gone or the policy is not attached.
    async fn detach_role_policy(&self, role_name: &str, policy_arn: &str)
    -> CloudResult<DeleteOutcome>;

    /// Fails while any policy is still attached.
    async fn delete_role(&self, role_name: &str) -> CloudResult<DeleteOutcome>;
}

/// Managed warehouse clusters.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn create_cluster(&self, spec: &ClusterSpec, role_arn: &str)
    -> CloudResult<CreateOutcome>;

    async fn delete_cluster(
        &self,
        identifier: &str,
        skip_final_snapshot: bool,
    ) -> CloudResult<DeleteOutcome>;

    /// `Ok(None)` when no cluster with this identifier exists.
    async fn describe_cluster(&self, identifier: &str) -> CloudResult<Option<ClusterState>>;
}

/// VPC security groups.
#[async_trait]
pub trait NetworkApi: Send + Sync {
    /// The first (default) security group of the VPC.
    async fn default_security_group(&self, vpc_id: &str) -> CloudResult<String>;

    async fn authorize_ingress(&self, group_id: &str, rule: &IngressRule)
    -> CloudResult<CreateOutcome>;
}

/// The three client handles a run needs, usually backed by one object.
#[derive(Clone)]
pub struct CloudClients {
    pub identity: Arc<dyn IdentityApi>,
    pub cluster: Arc<dyn ClusterApi>,
    pub network: Arc<dyn NetworkApi>,
}

impl CloudClients {
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: IdentityApi + ClusterApi + NetworkApi + 'static,
    {
        Self {
            identity: backend.clone(),
            cluster: backend.clone(),
            network: backend,
        }
    }
}
