//! Identity provisioner: the role the cluster assumes to read from S3.

use std::sync::Arc;

use tracing::{error, info, warn};

use dwh_cloud::{CreateOutcome, DeleteOutcome, IdentityApi};
use dwh_core::IdentityDescriptor;

use crate::error::IdentityError;

pub struct IdentityProvisioner {
    api: Arc<dyn IdentityApi>,
    identity: IdentityDescriptor,
}

impl IdentityProvisioner {
    pub fn new(api: Arc<dyn IdentityApi>, identity: IdentityDescriptor) -> Self {
        Self { api, identity }
    }

    pub fn identity(&self) -> &IdentityDescriptor {
        &self.identity
    }

    /// Create the role if needed, attach the read-only policy, and return the
    /// role ARN. An existing role is reused. Nothing is retried: IAM
    /// propagation delay is the caller's concern.
    pub async fn ensure_role(&self) -> Result<String, IdentityError> {
        let role = &self.identity.role_name;
        let policy = &self.identity.policy_arn;

        match self.api.create_role(&self.identity).await {
            Ok(CreateOutcome::Created) => info!(%role, "role created"),
            Ok(CreateOutcome::AlreadyExists) => warn!(%role, "role already exists, reusing it"),
            Err(source) => {
                error!(%role, error = %source, "role creation failed");
                return Err(IdentityError::CreateRole {
                    role: role.clone(),
                    source,
                });
            }
        }

        if let Err(source) = self.api.attach_role_policy(role, policy).await {
            error!(%role, %policy, error = %source, "policy attach failed");
            return Err(IdentityError::AttachPolicy {
                role: role.clone(),
                policy: policy.clone(),
                source,
            });
        }
        info!(%role, %policy, "policy attached");

        let arn = self.api.role_arn(role).await.map_err(|source| {
            error!(%role, error = %source, "role ARN lookup failed");
            IdentityError::ResolveArn {
                role: role.clone(),
                source,
            }
        })?;
        info!(%role, %arn, "role ARN resolved");
        Ok(arn)
    }

    /// Detach the policy, then delete the role. IAM refuses to delete a role
    /// with attached policies, so the order is fixed.
    pub async fn teardown_role(&self) -> Result<(), IdentityError> {
        let role = &self.identity.role_name;
        let policy = &self.identity.policy_arn;

        match self.api.detach_role_policy(role, policy).await {
            Ok(DeleteOutcome::Deleted) => info!(%role, %policy, "policy detached"),
            Ok(DeleteOutcome::NotFound) => warn!(%role, %policy, "policy was not attached"),
            Err(source) => {
                error!(%role, %policy, error = %source, "policy detach failed");
                return Err(IdentityError::DetachPolicy {
                    role: role.clone(),
                    policy: policy.clone(),
                    source,
                });
            }
        }

        match self.api.delete_role(role).await {
            Ok(DeleteOutcome::Deleted) => info!(%role, "role deleted"),
            Ok(DeleteOutcome::NotFound) => warn!(%role, "role was already gone"),
            Err(source) => {
                error!(%role, error = %source, "role deletion failed");
                return Err(IdentityError::DeleteRole {
                    role: role.clone(),
                    source,
                });
            }
        }
        Ok(())
    }
}
