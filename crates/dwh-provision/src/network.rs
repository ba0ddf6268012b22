//! Network exposer: opens the database port on the cluster's VPC.

use std::sync::Arc;

use tracing::{error, info};

use dwh_cloud::{CreateOutcome, IngressRule, NetworkApi};

use crate::error::NetworkError;

/// Result of an ingress authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exposure {
    Opened,
    /// The rule was already in place; the desired end state holds.
    AlreadyOpen,
}

pub struct NetworkExposer {
    api: Arc<dyn NetworkApi>,
}

impl NetworkExposer {
    pub fn new(api: Arc<dyn NetworkApi>) -> Self {
        Self { api }
    }

    /// Authorize inbound TCP on `port` from anywhere on the VPC's default
    /// security group.
    pub async fn open_port(&self, vpc_id: &str, port: u16) -> Result<Exposure, NetworkError> {
        let group = self
            .api
            .default_security_group(vpc_id)
            .await
            .map_err(|source| {
                error!(vpc = %vpc_id, error = %source, "security group lookup failed");
                NetworkError::Lookup {
                    vpc: vpc_id.to_string(),
                    source,
                }
            })?;

        let rule = IngressRule::tcp_from_anywhere(port);
        match self.api.authorize_ingress(&group, &rule).await {
            Ok(CreateOutcome::Created) => {
                info!(%group, port, cidr = %rule.cidr, "ingress opened");
                Ok(Exposure::Opened)
            }
            Ok(CreateOutcome::AlreadyExists) => Ok(Exposure::AlreadyOpen),
            Err(source) => {
                error!(%group, port, error = %source, "ingress authorization failed");
                Err(NetworkError::Authorize {
                    group,
                    port,
                    source,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dwh_cloud::{ClusterApi, CloudOp, SimulatedCloud};
    use dwh_core::{ClusterClass, ClusterSpec};

    async fn cloud_with_cluster() -> (SimulatedCloud, String) {
        let cloud = SimulatedCloud::new().with_creating_polls(0);
        let spec = ClusterSpec {
            identifier: "test-cluster".into(),
            node_type: "small".into(),
            node_count: 2,
            class: ClusterClass::MultiNode,
            db_name: "dwh".into(),
            master_user: "dwhuser".into(),
            master_password: "Passw0rd".into(),
            port: 5439,
        };
        cloud.create_cluster(&spec, "arn").await.unwrap();
        let vpc = cloud
            .describe_cluster("test-cluster")
            .await
            .unwrap()
            .and_then(|s| s.vpc_id)
            .unwrap();
        (cloud, vpc)
    }

    #[tokio::test]
    async fn opens_port_once_then_reports_already_open() {
        let (cloud, vpc) = cloud_with_cluster().await;
        let exposer = NetworkExposer::new(Arc::new(cloud.clone()));

        assert_eq!(exposer.open_port(&vpc, 5439).await.unwrap(), Exposure::Opened);
        assert_eq!(
            exposer.open_port(&vpc, 5439).await.unwrap(),
            Exposure::AlreadyOpen
        );

        let rules = cloud.ingress_rules().await;
        assert_eq!(rules, vec![IngressRule::tcp_from_anywhere(5439)]);
    }

    #[tokio::test]
    async fn unknown_vpc_is_lookup_error() {
        let (cloud, _) = cloud_with_cluster().await;
        let exposer = NetworkExposer::new(Arc::new(cloud));
        let err = exposer.open_port("vpc-missing", 5439).await.unwrap_err();
        assert!(matches!(err, NetworkError::Lookup { .. }));
    }

    #[tokio::test]
    async fn authorize_failure_is_surfaced() {
        let (cloud, vpc) = cloud_with_cluster().await;
        cloud.fail_next(CloudOp::AuthorizeIngress, "RulesPerSecurityGroupLimitExceeded").await;
        let exposer = NetworkExposer::new(Arc::new(cloud));
        let err = exposer.open_port(&vpc, 5439).await.unwrap_err();
        assert!(matches!(err, NetworkError::Authorize { port: 5439, .. }));
    }
}
