//! dwh-provision: lifecycle orchestration for the warehouse cluster.
//!
//! Creates the trust role, launches the cluster, waits for it to become
//! reachable, opens the database port, and hands the endpoint to the ETL
//! stage through the configuration file. The delete phase walks the same
//! resources in reverse.
//!
//! # Architecture
//!
//! ```text
//! Orchestrator (create | delete)
//!   ├── IdentityProvisioner   role + attached S3 read policy
//!   ├── ClusterProvisioner    single create / delete request
//!   ├── ReadinessPoller       poll_until(interval, max_wait, cancel)
//!   ├── NetworkExposer        inbound TCP on the database port
//!   └── EndpointPublisher     [cluster].host + [iam_role].arn, atomic write
//! ```
//!
//! # Failure model
//!
//! Each component returns its own error type. The orchestrator stops at the
//! first failure and reports the stage it was in; it never rolls back what
//! earlier stages created. Re-running the same phase is safe: existing roles,
//! clusters, and ingress rules are reused, and missing ones on delete are
//! treated as already gone.

pub mod cluster;
pub mod error;
pub mod identity;
pub mod network;
pub mod orchestrator;
pub mod poller;
pub mod publisher;

pub use cluster::{ClusterProvisioner, Launch, Termination};
pub use error::{
    IdentityError, NetworkError, OrchestratorError, PersistError, PollError, ProvisionError,
    ProvisionResult, StageError,
};
pub use identity::IdentityProvisioner;
pub use network::{Exposure, NetworkExposer};
pub use orchestrator::{Orchestrator, Stage};
pub use poller::{PollOutcome, PollPolicy, Probe, ReadinessPoller, poll_until};
pub use publisher::EndpointPublisher;
