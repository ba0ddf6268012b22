//! dwh-cloud: control-plane clients for the warehouse lifecycle.
//!
//! The provisioning core depends only on the three traits in [`api`]:
//! identity (roles and policies), cluster management, and network
//! (security-group ingress). Every call that can race with an earlier run
//! returns a tagged outcome (`Created | AlreadyExists`, `Deleted | NotFound`)
//! instead of an error string the caller would have to inspect.
//!
//! # Backends
//!
//! ```text
//! CloudClients
//!   ├── SimulatedCloud   in-memory control plane (tests, --backend memory)
//!   └── AwsCloud         IAM + Redshift + EC2 SDK clients (feature = "aws")
//! ```

pub mod api;
pub mod error;
pub mod memory;

#[cfg(feature = "aws")]
pub mod aws;

pub use api::{
    CloudClients, ClusterApi, CreateOutcome, DeleteOutcome, IdentityApi, IngressRule, NetworkApi,
};
pub use error::{CloudError, CloudResult};
pub use memory::{CloudOp, SimulatedCloud};

#[cfg(feature = "aws")]
pub use aws::AwsCloud;
