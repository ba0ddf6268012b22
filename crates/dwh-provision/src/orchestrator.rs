//! Orchestrator: sequences the lifecycle components for one phase.
//!
//! ```text
//! create: idle → provisioning-identity → provisioning-cluster → awaiting-available
//!              → exposing-network → publishing → done
//! delete: idle → terminating-cluster → awaiting-absent → deprovisioning-identity
//!              → clearing → done
//! ```
//!
//! A stage is entered only after the previous one succeeded. The first
//! failure halts the run; nothing created earlier is rolled back.

use std::fmt;
use std::path::Path;

use tokio::sync::watch;
use tracing::{error, info, warn};

use dwh_cloud::CloudClients;
use dwh_core::{ClusterSpec, ConfigResult, DwhConfig, PersistedEndpoint, Phase};

use crate::cluster::{ClusterProvisioner, Launch, Termination};
use crate::error::{NetworkError, OrchestratorError, PersistError, ProvisionResult, StageError};
use crate::identity::IdentityProvisioner;
use crate::network::{Exposure, NetworkExposer};
use crate::poller::{PollPolicy, ReadinessPoller};
use crate::publisher::EndpointPublisher;

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    ProvisioningIdentity,
    ProvisioningCluster,
    AwaitingAvailable,
    ExposingNetwork,
    Publishing,
    TerminatingCluster,
    AwaitingAbsent,
    DeprovisioningIdentity,
    Clearing,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::ProvisioningIdentity => "provisioning-identity",
            Stage::ProvisioningCluster => "provisioning-cluster",
            Stage::AwaitingAvailable => "awaiting-available",
            Stage::ExposingNetwork => "exposing-network",
            Stage::Publishing => "publishing",
            Stage::TerminatingCluster => "terminating-cluster",
            Stage::AwaitingAbsent => "awaiting-absent",
            Stage::DeprovisioningIdentity => "deprovisioning-identity",
            Stage::Clearing => "clearing",
            Stage::Done => "done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct Orchestrator {
    spec: ClusterSpec,
    identity: IdentityProvisioner,
    cluster: ClusterProvisioner,
    poller: ReadinessPoller,
    network: NetworkExposer,
    publisher: EndpointPublisher,
    stage: Stage,
    history: Vec<Stage>,
}

impl Orchestrator {
    /// Wire the components from an already-loaded configuration. The file at
    /// `config_path` is where the endpoint gets published.
    pub fn new(config: &DwhConfig, config_path: &Path, clients: CloudClients) -> ConfigResult<Self> {
        let spec = config.cluster_spec()?;
        let identity = config.identity()?;
        Ok(Self {
            spec,
            identity: IdentityProvisioner::new(clients.identity, identity),
            cluster: ClusterProvisioner::new(clients.cluster.clone()),
            poller: ReadinessPoller::new(clients.cluster, PollPolicy::from_config(&config.poll)),
            network: NetworkExposer::new(clients.network),
            publisher: EndpointPublisher::new(config_path),
            stage: Stage::Idle,
            history: Vec::new(),
        })
    }

    pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.poller = self.poller.with_policy(policy);
        self
    }

    /// Stop waiting when `true` is sent on `cancel`.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.poller = self.poller.with_cancel(cancel);
        self
    }

    pub fn spec(&self) -> &ClusterSpec {
        &self.spec
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Every stage entered during the last run, in order.
    pub fn history(&self) -> &[Stage] {
        &self.history
    }

    /// Run one phase to completion. `create` yields the published endpoint.
    pub async fn run(&mut self, phase: Phase) -> ProvisionResult<Option<PersistedEndpoint>> {
        match phase {
            Phase::Create => self.create().await.map(Some),
            Phase::Delete => self.delete().await.map(|()| None),
        }
    }

    pub async fn create(&mut self) -> ProvisionResult<PersistedEndpoint> {
        self.reset();
        let phase = Phase::Create;
        let id = self.spec.identifier.clone();
        info!(cluster = %id, "cluster creation started");

        self.enter(Stage::ProvisioningIdentity);
        let role_arn = self
            .identity
            .ensure_role()
            .await
            .map_err(|e| self.fail(phase, e))?;

        self.enter(Stage::ProvisioningCluster);
        match self
            .cluster
            .launch(&self.spec, &role_arn)
            .await
            .map_err(|e| self.fail(phase, e))?
        {
            Launch::Created => {}
            Launch::AlreadyExists => warn!(cluster = %id, "cluster already exists, waiting on it"),
        }

        self.enter(Stage::AwaitingAvailable);
        let state = self
            .poller
            .await_available(&id)
            .await
            .map_err(|e| self.fail(phase, e))?;

        self.enter(Stage::ExposingNetwork);
        let vpc = state
            .vpc_id
            .clone()
            .ok_or_else(|| self.fail(phase, NetworkError::MissingVpc { cluster: id.clone() }))?;
        match self
            .network
            .open_port(&vpc, self.spec.port)
            .await
            .map_err(|e| self.fail(phase, e))?
        {
            Exposure::Opened => {}
            Exposure::AlreadyOpen => {
                warn!(cluster = %id, port = self.spec.port, "ingress rule already exists")
            }
        }

        self.enter(Stage::Publishing);
        let host = state
            .endpoint
            .as_ref()
            .map(|e| e.address.clone())
            .ok_or_else(|| self.fail(phase, PersistError::MissingEndpoint { cluster: id.clone() }))?;
        let endpoint = PersistedEndpoint::new(host, state.role_arn.clone().unwrap_or(role_arn));
        self.publisher
            .publish(&endpoint)
            .map_err(|e| self.fail(phase, e))?;

        self.enter(Stage::Done);
        info!(cluster = %id, host = %endpoint.host, role_arn = %endpoint.role_arn, "cluster ready");
        Ok(endpoint)
    }

    pub async fn delete(&mut self) -> ProvisionResult<()> {
        self.reset();
        let phase = Phase::Delete;
        let id = self.spec.identifier.clone();
        info!(cluster = %id, "cluster deletion started");

        self.enter(Stage::TerminatingCluster);
        match self
            .cluster
            .terminate(&id)
            .await
            .map_err(|e| self.fail(phase, e))?
        {
            Termination::Deleting => {}
            Termination::NotFound => warn!(cluster = %id, "cluster not found, treating as deleted"),
        }

        self.enter(Stage::AwaitingAbsent);
        self.poller
            .await_absent(&id)
            .await
            .map_err(|e| self.fail(phase, e))?;

        self.enter(Stage::DeprovisioningIdentity);
        self.identity
            .teardown_role()
            .await
            .map_err(|e| self.fail(phase, e))?;

        self.enter(Stage::Clearing);
        self.publisher.clear().map_err(|e| self.fail(phase, e))?;

        self.enter(Stage::Done);
        info!(cluster = %id, "cluster deleted");
        Ok(())
    }

    fn reset(&mut self) {
        self.stage = Stage::Idle;
        self.history.clear();
    }

    fn enter(&mut self, stage: Stage) {
        info!(cluster = %self.spec.identifier, from = %self.stage, to = %stage, "stage transition");
        self.stage = stage;
        self.history.push(stage);
    }

    fn fail(&self, phase: Phase, err: impl Into<StageError>) -> OrchestratorError {
        let source = err.into();
        error!(
            cluster = %self.spec.identifier,
            %phase,
            stage = %self.stage,
            error = %source,
            "run halted; resources created so far are left in place"
        );
        OrchestratorError {
            phase,
            cluster: self.spec.identifier.clone(),
            stage: self.stage,
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use dwh_cloud::{CloudOp, SimulatedCloud};
    use dwh_core::ClusterStatus;

    use crate::error::{IdentityError, PollError};

    const CONFIG: &str = r#"
[dwh]
cluster_type = "multi-node"
num_nodes = 2
node_type = "small"
cluster_identifier = "test-cluster"
db = "dwh"
db_user = "dwhuser"
db_password = "Passw0rd"
port = 5439
iam_role_name = "dwhRole"

[poll]
interval_secs = 30
max_wait_secs = 600

[cluster]
host = "None"
db_name = "dwh"

[iam_role]
arn = "None"
"#;

    fn setup(cloud: &SimulatedCloud) -> (tempfile::TempDir, Orchestrator) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dwh.toml");
        std::fs::write(&path, CONFIG).unwrap();
        let config = DwhConfig::from_file(&path).unwrap();
        let clients = CloudClients::from_backend(Arc::new(cloud.clone()));
        let orchestrator = Orchestrator::new(&config, &path, clients).unwrap();
        (dir, orchestrator)
    }

    #[tokio::test(start_paused = true)]
    async fn create_walks_every_stage_in_order() {
        let cloud = SimulatedCloud::new();
        let (_dir, mut orchestrator) = setup(&cloud);

        orchestrator.create().await.unwrap();
        assert_eq!(
            orchestrator.history(),
            &[
                Stage::ProvisioningIdentity,
                Stage::ProvisioningCluster,
                Stage::AwaitingAvailable,
                Stage::ExposingNetwork,
                Stage::Publishing,
                Stage::Done,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn delete_walks_every_stage_in_order() {
        let cloud = SimulatedCloud::new();
        let (_dir, mut orchestrator) = setup(&cloud);
        orchestrator.create().await.unwrap();

        orchestrator.delete().await.unwrap();
        assert_eq!(
            orchestrator.history(),
            &[
                Stage::TerminatingCluster,
                Stage::AwaitingAbsent,
                Stage::DeprovisioningIdentity,
                Stage::Clearing,
                Stage::Done,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn identity_failure_halts_before_launch() {
        let cloud = SimulatedCloud::new();
        cloud.fail_next(CloudOp::CreateRole, "AccessDenied").await;
        let (_dir, mut orchestrator) = setup(&cloud);

        let err = orchestrator.create().await.unwrap_err();
        assert_eq!(err.stage, Stage::ProvisioningIdentity);
        assert_eq!(err.phase, Phase::Create);
        assert!(matches!(
            err.source,
            StageError::Identity(IdentityError::CreateRole { .. })
        ));
        assert_eq!(cloud.call_count(CloudOp::CreateCluster).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_failure_leaves_cluster_in_place() {
        let cloud = SimulatedCloud::new();
        cloud
            .script_statuses([ClusterStatus::Creating, ClusterStatus::Failed])
            .await;
        let (_dir, mut orchestrator) = setup(&cloud);

        let err = orchestrator.create().await.unwrap_err();
        assert_eq!(err.stage, Stage::AwaitingAvailable);
        assert!(matches!(err.source, StageError::Poll(PollError::Failed { .. })));
        // No compensating teardown.
        assert!(cloud.cluster_exists("test-cluster").await);
        assert_eq!(cloud.call_count(CloudOp::DeleteCluster).await, 0);
        assert_eq!(cloud.call_count(CloudOp::AuthorizeIngress).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_create_times_out() {
        let cloud = SimulatedCloud::new().with_creating_polls(1_000);
        let (_dir, orchestrator) = setup(&cloud);
        let mut orchestrator = orchestrator.with_poll_policy(PollPolicy {
            interval: Duration::from_secs(30),
            max_wait: Duration::from_secs(90),
        });

        let err = orchestrator.create().await.unwrap_err();
        assert!(matches!(
            err.source,
            StageError::Poll(PollError::Timeout { attempts: 4, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn error_message_names_phase_cluster_and_stage() {
        let cloud = SimulatedCloud::new();
        cloud.fail_next(CloudOp::DeleteCluster, "InvalidClusterState").await;
        let (_dir, mut orchestrator) = setup(&cloud);

        let err = orchestrator.delete().await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "delete of cluster test-cluster halted while terminating-cluster"
        );
    }
}
