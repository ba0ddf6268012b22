//! AWS backend: IAM for the role, Redshift for the cluster, EC2 for ingress.

use async_trait::async_trait;
use aws_sdk_ec2::error::ProvideErrorMetadata;
use aws_sdk_iam::config::{Credentials, Region};
use aws_sdk_iam::error::DisplayErrorContext;
use tracing::{debug, info};

use dwh_core::config::AwsConfig;
use dwh_core::{ClusterClass, ClusterSpec, ClusterState, ClusterStatus, Endpoint, IdentityDescriptor};

use crate::api::{ClusterApi, CreateOutcome, DeleteOutcome, IdentityApi, IngressRule, NetworkApi};
use crate::error::{CloudError, CloudResult};

/// EC2 error code for an ingress rule that is already present.
const DUPLICATE_PERMISSION: &str = "InvalidPermission.Duplicate";

/// SDK clients for the three services a lifecycle run touches.
#[derive(Debug, Clone)]
pub struct AwsCloud {
    iam: aws_sdk_iam::Client,
    redshift: aws_sdk_redshift::Client,
    ec2: aws_sdk_ec2::Client,
}

impl AwsCloud {
    /// Load SDK configuration for the configured region. Static keys from
    /// `[aws]` win over the default credential chain.
    pub async fn connect(config: &AwsConfig) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));
        if let (Some(key), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
            loader = loader.credentials_provider(Credentials::new(
                key.clone(),
                secret.clone(),
                None,
                None,
                "dwh-config",
            ));
        }
        let sdk = loader.load().await;
        info!(region = %config.region, "aws clients created");

        Self {
            iam: aws_sdk_iam::Client::new(&sdk),
            redshift: aws_sdk_redshift::Client::new(&sdk),
            ec2: aws_sdk_ec2::Client::new(&sdk),
        }
    }
}

fn rejected<E>(operation: &'static str, err: E) -> CloudError
where
    E: std::error::Error,
{
    CloudError::rejected(operation, DisplayErrorContext(err).to_string())
}

/// `NumberOfNodes` is an `i32` on the wire.
fn node_count_param(spec: &ClusterSpec) -> CloudResult<i32> {
    i32::try_from(spec.node_count).map_err(|_| {
        CloudError::rejected(
            "CreateCluster",
            format!("node count {} is out of range", spec.node_count),
        )
    })
}

#[async_trait]
impl IdentityApi for AwsCloud {
    async fn create_role(&self, identity: &IdentityDescriptor) -> CloudResult<CreateOutcome> {
        let result = self
            .iam
            .create_role()
            .path("/")
            .role_name(&identity.role_name)
            .description(&identity.description)
            .assume_role_policy_document(&identity.trust_policy)
            .send()
            .await;
        match result {
            Ok(_) => Ok(CreateOutcome::Created),
            Err(err) => match err.as_service_error() {
                Some(e) if e.is_entity_already_exists_exception() => {
                    Ok(CreateOutcome::AlreadyExists)
                }
                _ => Err(rejected("CreateRole", err)),
            },
        }
    }

    async fn attach_role_policy(&self, role_name: &str, policy_arn: &str) -> CloudResult<()> {
        self.iam
            .attach_role_policy()
            .role_name(role_name)
            .policy_arn(policy_arn)
            .send()
            .await
            .map_err(|e| rejected("AttachRolePolicy", e))?;
        Ok(())
    }

    async fn role_arn(&self, role_name: &str) -> CloudResult<String> {
        let output = match self.iam.get_role().role_name(role_name).send().await {
            Ok(output) => output,
            Err(err) => {
                return match err.as_service_error() {
                    Some(e) if e.is_no_such_entity_exception() => {
                        Err(CloudError::NotFound(format!("role {role_name}")))
                    }
                    _ => Err(rejected("GetRole", err)),
                };
            }
        };
        let role = output.role().ok_or_else(|| CloudError::Malformed {
            operation: "GetRole",
            message: "response has no role".into(),
        })?;
        Ok(role.arn().to_string())
    }

    async fn detach_role_policy(
        &self,
        role_name: &str,
        policy_arn: &str,
    ) -> CloudResult<DeleteOutcome> {
        let result = self
            .iam
            .detach_role_policy()
            .role_name(role_name)
            .policy_arn(policy_arn)
            .send()
            .await;
        match result {
            Ok(_) => Ok(DeleteOutcome::Deleted),
            Err(err) => match err.as_service_error() {
                Some(e) if e.is_no_such_entity_exception() => Ok(DeleteOutcome::NotFound),
                _ => Err(rejected("DetachRolePolicy", err)),
            },
        }
    }

    async fn delete_role(&self, role_name: &str) -> CloudResult<DeleteOutcome> {
        match self.iam.delete_role().role_name(role_name).send().await {
            Ok(_) => Ok(DeleteOutcome::Deleted),
            Err(err) => match err.as_service_error() {
                Some(e) if e.is_no_such_entity_exception() => Ok(DeleteOutcome::NotFound),
                _ => Err(rejected("DeleteRole", err)),
            },
        }
    }
}

#[async_trait]
impl ClusterApi for AwsCloud {
    async fn create_cluster(&self, spec: &ClusterSpec, role_arn: &str) -> CloudResult<CreateOutcome> {
        let mut request = self
            .redshift
            .create_cluster()
            .cluster_type(spec.class.as_str())
            .node_type(&spec.node_type)
            .db_name(&spec.db_name)
            .cluster_identifier(&spec.identifier)
            .master_username(&spec.master_user)
            .master_user_password(&spec.master_password)
            .port(i32::from(spec.port))
            .iam_roles(role_arn);
        if spec.class == ClusterClass::MultiNode {
            request = request.number_of_nodes(node_count_param(spec)?);
        }
        match request.send().await {
            Ok(_) => Ok(CreateOutcome::Created),
            Err(err) => match err.as_service_error() {
                Some(e) if e.is_cluster_already_exists_fault() => Ok(CreateOutcome::AlreadyExists),
                _ => Err(rejected("CreateCluster", err)),
            },
        }
    }

    async fn delete_cluster(
        &self,
        identifier: &str,
        skip_final_snapshot: bool,
    ) -> CloudResult<DeleteOutcome> {
        let result = self
            .redshift
            .delete_cluster()
            .cluster_identifier(identifier)
            .skip_final_cluster_snapshot(skip_final_snapshot)
            .send()
            .await;
        match result {
            Ok(_) => Ok(DeleteOutcome::Deleted),
            Err(err) => match err.as_service_error() {
                Some(e) if e.is_cluster_not_found_fault() => Ok(DeleteOutcome::NotFound),
                _ => Err(rejected("DeleteCluster", err)),
            },
        }
    }

    async fn describe_cluster(&self, identifier: &str) -> CloudResult<Option<ClusterState>> {
        let result = self
            .redshift
            .describe_clusters()
            .cluster_identifier(identifier)
            .send()
            .await;
        let output = match result {
            Ok(output) => output,
            Err(err) => {
                return match err.as_service_error() {
                    Some(e) if e.is_cluster_not_found_fault() => Ok(None),
                    _ => Err(rejected("DescribeClusters", err)),
                };
            }
        };

        let Some(cluster) = output.clusters().first() else {
            return Ok(None);
        };
        let status = cluster
            .cluster_status()
            .map(ClusterStatus::parse)
            .ok_or_else(|| CloudError::Malformed {
                operation: "DescribeClusters",
                message: format!("cluster {identifier} has no status"),
            })?;
        let endpoint = cluster.endpoint().and_then(|e| {
            e.address().map(|address| Endpoint {
                address: address.to_string(),
                port: e.port().and_then(|p| u16::try_from(p).ok()).unwrap_or(5439),
            })
        });
        let role_arn = cluster
            .iam_roles()
            .first()
            .and_then(|r| r.iam_role_arn())
            .map(str::to_string);

        debug!(cluster = %identifier, %status, "described cluster");
        Ok(Some(ClusterState {
            identifier: identifier.to_string(),
            status,
            vpc_id: cluster.vpc_id().map(str::to_string),
            endpoint,
            role_arn,
        }))
    }
}

#[async_trait]
impl NetworkApi for AwsCloud {
    async fn default_security_group(&self, vpc_id: &str) -> CloudResult<String> {
        let filter = aws_sdk_ec2::types::Filter::builder()
            .name("vpc-id")
            .values(vpc_id)
            .build();
        let output = self
            .ec2
            .describe_security_groups()
            .filters(filter)
            .send()
            .await
            .map_err(|e| rejected("DescribeSecurityGroups", e))?;

        let groups = output.security_groups();
        let group = groups
            .iter()
            .find(|g| g.group_name() == Some("default"))
            .or_else(|| groups.first())
            .ok_or_else(|| CloudError::NotFound(format!("security groups for {vpc_id}")))?;
        group
            .group_id()
            .map(str::to_string)
            .ok_or_else(|| CloudError::Malformed {
                operation: "DescribeSecurityGroups",
                message: "security group has no id".into(),
            })
    }

    async fn authorize_ingress(&self, group_id: &str, rule: &IngressRule) -> CloudResult<CreateOutcome> {
        let result = self
            .ec2
            .authorize_security_group_ingress()
            .group_id(group_id)
            .ip_protocol(&rule.protocol)
            .from_port(i32::from(rule.from_port))
            .to_port(i32::from(rule.to_port))
            .cidr_ip(&rule.cidr)
            .send()
            .await;
        match result {
            Ok(_) => Ok(CreateOutcome::Created),
            Err(err) if err.code() == Some(DUPLICATE_PERMISSION) => Ok(CreateOutcome::AlreadyExists),
            Err(err) => Err(rejected("AuthorizeSecurityGroupIngress", err)),
        }
    }
}
