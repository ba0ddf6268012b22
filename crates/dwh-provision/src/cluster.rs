//! Cluster provisioner: one create or delete request, no waiting.

use std::sync::Arc;

use tracing::{error, info};

use dwh_cloud::{ClusterApi, CreateOutcome, DeleteOutcome};
use dwh_core::ClusterSpec;

use crate::error::ProvisionError;

/// Result of a create request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Launch {
    Created,
    AlreadyExists,
}

/// Result of a delete request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Deleting,
    NotFound,
}

pub struct ClusterProvisioner {
    api: Arc<dyn ClusterApi>,
}

impl ClusterProvisioner {
    pub fn new(api: Arc<dyn ClusterApi>) -> Self {
        Self { api }
    }

    /// Issue the create request with the role attached. Availability is the
    /// poller's job.
    pub async fn launch(&self, spec: &ClusterSpec, role_arn: &str) -> Result<Launch, ProvisionError> {
        let cluster = &spec.identifier;
        match self.api.create_cluster(spec, role_arn).await {
            Ok(CreateOutcome::Created) => {
                info!(
                    %cluster,
                    node_type = %spec.node_type,
                    nodes = spec.node_count,
                    "cluster create requested"
                );
                Ok(Launch::Created)
            }
            Ok(CreateOutcome::AlreadyExists) => Ok(Launch::AlreadyExists),
            Err(source) => {
                error!(%cluster, error = %source, "cluster create rejected");
                Err(ProvisionError::Launch {
                    cluster: cluster.clone(),
                    source,
                })
            }
        }
    }

    /// Issue the delete request. No final snapshot is ever taken.
    pub async fn terminate(&self, identifier: &str) -> Result<Termination, ProvisionError> {
        match self.api.delete_cluster(identifier, true).await {
            Ok(DeleteOutcome::Deleted) => {
                info!(cluster = %identifier, "cluster delete requested");
                Ok(Termination::Deleting)
            }
            Ok(DeleteOutcome::NotFound) => Ok(Termination::NotFound),
            Err(source) => {
                error!(cluster = %identifier, error = %source, "cluster delete rejected");
                Err(ProvisionError::Terminate {
                    cluster: identifier.to_string(),
                    source,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dwh_cloud::{CloudOp, SimulatedCloud};
    use dwh_core::ClusterClass;

    fn spec() -> ClusterSpec {
        ClusterSpec {
            identifier: "test-cluster".into(),
            node_type: "small".into(),
            node_count: 2,
            class: ClusterClass::MultiNode,
            db_name: "dwh".into(),
            master_user: "dwhuser".into(),
            master_password: "Passw0rd".into(),
            port: 5439,
        }
    }

    #[tokio::test]
    async fn launch_then_relaunch() {
        let cloud = SimulatedCloud::new();
        let provisioner = ClusterProvisioner::new(Arc::new(cloud.clone()));

        assert_eq!(provisioner.launch(&spec(), "arn").await.unwrap(), Launch::Created);
        assert_eq!(
            provisioner.launch(&spec(), "arn").await.unwrap(),
            Launch::AlreadyExists
        );
        // Launch never polls.
        assert_eq!(cloud.call_count(CloudOp::DescribeCluster).await, 0);
    }

    #[tokio::test]
    async fn rejected_launch_is_not_retried() {
        let cloud = SimulatedCloud::new();
        cloud.fail_next(CloudOp::CreateCluster, "ClusterQuotaExceeded").await;
        let provisioner = ClusterProvisioner::new(Arc::new(cloud.clone()));

        let err = provisioner.launch(&spec(), "arn").await.unwrap_err();
        assert!(matches!(err, ProvisionError::Launch { .. }));
        assert_eq!(cloud.call_count(CloudOp::CreateCluster).await, 1);
    }

    #[tokio::test]
    async fn terminate_skips_final_snapshot() {
        let cloud = SimulatedCloud::new();
        let provisioner = ClusterProvisioner::new(Arc::new(cloud.clone()));
        provisioner.launch(&spec(), "arn").await.unwrap();

        assert_eq!(
            provisioner.terminate("test-cluster").await.unwrap(),
            Termination::Deleting
        );
        assert_eq!(cloud.last_skip_final_snapshot().await, Some(true));
    }

    #[tokio::test]
    async fn terminate_missing_cluster_reports_not_found() {
        let cloud = SimulatedCloud::new();
        let provisioner = ClusterProvisioner::new(Arc::new(cloud));
        assert_eq!(
            provisioner.terminate("test-cluster").await.unwrap(),
            Termination::NotFound
        );
    }
}
