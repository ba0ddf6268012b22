//! In-memory control plane.
//!
//! Mirrors the behaviour the orchestrator depends on: create calls report
//! `AlreadyExists` on a second attempt, roles cannot be deleted while a
//! policy is attached, clusters move through `creating` and `deleting`
//! for a configurable number of describe calls, and duplicate ingress
//! rules are reported as such. Every call is recorded so tests can assert
//! ordering, and single calls can be made to fail on demand.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use dwh_core::{ClusterSpec, ClusterState, ClusterStatus, Endpoint, IdentityDescriptor};

use crate::api::{ClusterApi, CreateOutcome, DeleteOutcome, IdentityApi, IngressRule, NetworkApi};
use crate::error::{CloudError, CloudResult};

const ACCOUNT_ID: &str = "123456789012";
const VPC_ID: &str = "vpc-0sim0001";
const SECURITY_GROUP_ID: &str = "sg-0sim0001";

/// Operations recorded in the call log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloudOp {
    CreateRole,
    AttachRolePolicy,
    GetRole,
    DetachRolePolicy,
    DeleteRole,
    CreateCluster,
    DeleteCluster,
    DescribeCluster,
    DescribeSecurityGroups,
    AuthorizeIngress,
}

#[derive(Debug)]
struct SimRole {
    arn: String,
    attached: BTreeSet<String>,
}

#[derive(Debug)]
struct SimCluster {
    status: ClusterStatus,
    /// Describe calls left before the current transient status resolves.
    polls_remaining: u32,
    role_arn: String,
    port: u16,
}

#[derive(Debug, Default)]
struct SimState {
    roles: HashMap<String, SimRole>,
    clusters: HashMap<String, SimCluster>,
    /// Security group rules keyed by group id.
    groups: HashMap<String, Vec<IngressRule>>,
    /// Statuses returned by the next describe calls, ahead of the natural lifecycle.
    scripted: VecDeque<ClusterStatus>,
    faults: HashMap<CloudOp, String>,
    calls: Vec<CloudOp>,
    last_skip_final_snapshot: Option<bool>,
}

impl SimState {
    fn record(&mut self, op: CloudOp) -> CloudResult<()> {
        self.calls.push(op);
        match self.faults.remove(&op) {
            Some(message) => Err(CloudError::rejected(op_name(op), message)),
            None => Ok(()),
        }
    }
}

/// Thread-safe simulated control plane; clones share state.
#[derive(Debug, Clone)]
pub struct SimulatedCloud {
    state: Arc<Mutex<SimState>>,
    region: String,
    creating_polls: u32,
    deleting_polls: u32,
}

impl Default for SimulatedCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedCloud {
    /// Clusters report `creating` twice and `deleting` once before settling.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState::default())),
            region: "us-west-2".to_string(),
            creating_polls: 2,
            deleting_polls: 1,
        }
    }

    pub fn with_region(mut self, region: &str) -> Self {
        self.region = region.to_string();
        self
    }

    pub fn with_creating_polls(mut self, polls: u32) -> Self {
        self.creating_polls = polls;
        self
    }

    pub fn with_deleting_polls(mut self, polls: u32) -> Self {
        self.deleting_polls = polls;
        self
    }

    /// Queue statuses for upcoming describe calls. `Absent` answers "not found".
    pub async fn script_statuses(&self, statuses: impl IntoIterator<Item = ClusterStatus>) {
        self.state.lock().await.scripted.extend(statuses);
    }

    /// Make the next call of `op` fail with a rejection.
    pub async fn fail_next(&self, op: CloudOp, message: &str) {
        self.state.lock().await.faults.insert(op, message.to_string());
    }

    /// Seed a role as if a previous run had created it.
    pub async fn seed_role(&self, role_name: &str) {
        let mut state = self.state.lock().await;
        state.roles.insert(
            role_name.to_string(),
            SimRole {
                arn: role_arn_for(role_name),
                attached: BTreeSet::new(),
            },
        );
    }

    pub async fn calls(&self) -> Vec<CloudOp> {
        self.state.lock().await.calls.clone()
    }

    pub async fn call_count(&self, op: CloudOp) -> usize {
        self.state.lock().await.calls.iter().filter(|c| **c == op).count()
    }

    pub async fn role_count(&self) -> usize {
        self.state.lock().await.roles.len()
    }

    pub async fn attached_policy_count(&self) -> usize {
        self.state
            .lock()
            .await
            .roles
            .values()
            .map(|r| r.attached.len())
            .sum()
    }

    pub async fn cluster_exists(&self, identifier: &str) -> bool {
        self.state.lock().await.clusters.contains_key(identifier)
    }

    pub async fn ingress_rules(&self) -> Vec<IngressRule> {
        self.state
            .lock()
            .await
            .groups
            .values()
            .flatten()
            .cloned()
            .collect()
    }

    /// `skip_final_snapshot` as passed to the most recent delete.
    pub async fn last_skip_final_snapshot(&self) -> Option<bool> {
        self.state.lock().await.last_skip_final_snapshot
    }

    /// Address the simulated cluster reports once available.
    pub fn endpoint_address(&self, identifier: &str) -> String {
        format!(
            "{}.csim0001.{}.redshift.amazonaws.com",
            identifier.to_ascii_lowercase(),
            self.region
        )
    }

    fn snapshot(&self, identifier: &str, cluster: &SimCluster, status: ClusterStatus) -> ClusterState {
        let endpoint = (status == ClusterStatus::Available).then(|| Endpoint {
            address: self.endpoint_address(identifier),
            port: cluster.port,
        });
        ClusterState {
            identifier: identifier.to_string(),
            status,
            vpc_id: Some(VPC_ID.to_string()),
            endpoint,
            role_arn: Some(cluster.role_arn.clone()),
        }
    }
}

pub fn role_arn_for(role_name: &str) -> String {
    format!("arn:aws:iam::{ACCOUNT_ID}:role/{role_name}")
}

fn op_name(op: CloudOp) -> &'static str {
    match op {
        CloudOp::CreateRole => "CreateRole",
        CloudOp::AttachRolePolicy => "AttachRolePolicy",
        CloudOp::GetRole => "GetRole",
        CloudOp::DetachRolePolicy => "DetachRolePolicy",
        CloudOp::DeleteRole => "DeleteRole",
        CloudOp::CreateCluster => "CreateCluster",
        CloudOp::DeleteCluster => "DeleteCluster",
        CloudOp::DescribeCluster => "DescribeClusters",
        CloudOp::DescribeSecurityGroups => "DescribeSecurityGroups",
        CloudOp::AuthorizeIngress => "AuthorizeSecurityGroupIngress",
    }
}

#[async_trait]
impl IdentityApi for SimulatedCloud {
    async fn create_role(&self, identity: &IdentityDescriptor) -> CloudResult<CreateOutcome> {
        let mut state = self.state.lock().await;
        state.record(CloudOp::CreateRole)?;
        if state.roles.contains_key(&identity.role_name) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        state.roles.insert(
            identity.role_name.clone(),
            SimRole {
                arn: role_arn_for(&identity.role_name),
                attached: BTreeSet::new(),
            },
        );
        debug!(role = %identity.role_name, "simulated role created");
        Ok(CreateOutcome::Created)
    }

    async fn attach_role_policy(&self, role_name: &str, policy_arn: &str) -> CloudResult<()> {
        let mut state = self.state.lock().await;
        state.record(CloudOp::AttachRolePolicy)?;
        let role = state.roles.get_mut(role_name).ok_or_else(|| {
            CloudError::rejected("AttachRolePolicy", format!("NoSuchEntity: role {role_name}"))
        })?;
        role.attached.insert(policy_arn.to_string());
        Ok(())
    }

    async fn role_arn(&self, role_name: &str) -> CloudResult<String> {
        let mut state = self.state.lock().await;
        state.record(CloudOp::GetRole)?;
        state
            .roles
            .get(role_name)
            .map(|r| r.arn.clone())
            .ok_or_else(|| CloudError::NotFound(format!("role {role_name}")))
    }

    async fn detach_role_policy(
        &self,
        role_name: &str,
        policy_arn: &str,
    ) -> CloudResult<DeleteOutcome> {
        let mut state = self.state.lock().await;
        state.record(CloudOp::DetachRolePolicy)?;
        let detached = state
            .roles
            .get_mut(role_name)
            .is_some_and(|r| r.attached.remove(policy_arn));
        Ok(if detached {
            DeleteOutcome::Deleted
        } else {
            DeleteOutcome::NotFound
        })
    }

    async fn delete_role(&self, role_name: &str) -> CloudResult<DeleteOutcome> {
        let mut state = self.state.lock().await;
        state.record(CloudOp::DeleteRole)?;
        let attached = match state.roles.get(role_name) {
            None => return Ok(DeleteOutcome::NotFound),
            Some(role) => role.attached.len(),
        };
        if attached > 0 {
            return Err(CloudError::rejected(
                "DeleteRole",
                "DeleteConflict: cannot delete entity, must detach all policies first",
            ));
        }
        state.roles.remove(role_name);
        Ok(DeleteOutcome::Deleted)
    }
}

#[async_trait]
impl ClusterApi for SimulatedCloud {
    async fn create_cluster(&self, spec: &ClusterSpec, role_arn: &str) -> CloudResult<CreateOutcome> {
        let mut state = self.state.lock().await;
        state.record(CloudOp::CreateCluster)?;
        if state.clusters.contains_key(&spec.identifier) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        state.clusters.insert(
            spec.identifier.clone(),
            SimCluster {
                status: ClusterStatus::Creating,
                polls_remaining: self.creating_polls,
                role_arn: role_arn.to_string(),
                port: spec.port,
            },
        );
        state.groups.entry(SECURITY_GROUP_ID.to_string()).or_default();
        debug!(cluster = %spec.identifier, "simulated cluster creating");
        Ok(CreateOutcome::Created)
    }

    async fn delete_cluster(
        &self,
        identifier: &str,
        skip_final_snapshot: bool,
    ) -> CloudResult<DeleteOutcome> {
        let mut state = self.state.lock().await;
        state.record(CloudOp::DeleteCluster)?;
        state.last_skip_final_snapshot = Some(skip_final_snapshot);
        let Some(cluster) = state.clusters.get_mut(identifier) else {
            return Ok(DeleteOutcome::NotFound);
        };
        if cluster.status != ClusterStatus::Deleting {
            cluster.status = ClusterStatus::Deleting;
            cluster.polls_remaining = self.deleting_polls;
        }
        Ok(DeleteOutcome::Deleted)
    }

    async fn describe_cluster(&self, identifier: &str) -> CloudResult<Option<ClusterState>> {
        let mut state = self.state.lock().await;
        state.record(CloudOp::DescribeCluster)?;

        if let Some(status) = state.scripted.pop_front() {
            if status == ClusterStatus::Absent {
                return Ok(None);
            }
            let cluster = state.clusters.get(identifier);
            let snapshot = match cluster {
                Some(c) => self.snapshot(identifier, c, status),
                None => ClusterState {
                    identifier: identifier.to_string(),
                    endpoint: (status == ClusterStatus::Available).then(|| Endpoint {
                        address: self.endpoint_address(identifier),
                        port: 5439,
                    }),
                    status,
                    vpc_id: Some(VPC_ID.to_string()),
                    role_arn: None,
                },
            };
            return Ok(Some(snapshot));
        }

        let state = &mut *state;
        let Some(cluster) = state.clusters.get_mut(identifier) else {
            return Ok(None);
        };
        let gone = match cluster.status {
            ClusterStatus::Creating if cluster.polls_remaining == 0 => {
                cluster.status = ClusterStatus::Available;
                false
            }
            ClusterStatus::Deleting if cluster.polls_remaining == 0 => true,
            ClusterStatus::Creating | ClusterStatus::Deleting => {
                cluster.polls_remaining -= 1;
                false
            }
            _ => false,
        };
        if gone {
            state.clusters.remove(identifier);
            return Ok(None);
        }
        let status = cluster.status.clone();
        Ok(Some(self.snapshot(identifier, cluster, status)))
    }
}

#[async_trait]
impl NetworkApi for SimulatedCloud {
    async fn default_security_group(&self, vpc_id: &str) -> CloudResult<String> {
        let mut state = self.state.lock().await;
        state.record(CloudOp::DescribeSecurityGroups)?;
        if vpc_id == VPC_ID && state.groups.contains_key(SECURITY_GROUP_ID) {
            Ok(SECURITY_GROUP_ID.to_string())
        } else {
            Err(CloudError::NotFound(format!("security groups for {vpc_id}")))
        }
    }

    async fn authorize_ingress(&self, group_id: &str, rule: &IngressRule) -> CloudResult<CreateOutcome> {
        let mut state = self.state.lock().await;
        state.record(CloudOp::AuthorizeIngress)?;
        let rules = state
            .groups
            .get_mut(group_id)
            .ok_or_else(|| CloudError::NotFound(format!("security group {group_id}")))?;
        if rules.contains(rule) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        rules.push(rule.clone());
        Ok(CreateOutcome::Created)
    }
}
