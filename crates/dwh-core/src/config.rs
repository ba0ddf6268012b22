//! dwh.toml configuration parser.
//!
//! A single file carries everything a run needs: cloud credentials, the
//! desired cluster shape, poll timing, and the connection section the
//! ETL stage reads back after `create` has published the endpoint.
//!
//! ```toml
//! [aws]
//! region = "us-west-2"
//!
//! [dwh]
//! cluster_type = "multi-node"
//! num_nodes = 4
//! node_type = "dc2.large"
//! cluster_identifier = "dwhCluster"
//! db = "dwh"
//! db_user = "dwhuser"
//! db_password = "Passw0rd"
//! port = 5439
//! iam_role_name = "dwhRole"
//!
//! [cluster]
//! host = "None"
//!
//! [iam_role]
//! arn = "None"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::types::{ClusterClass, ClusterSpec, IdentityDescriptor, PersistedEndpoint, UNSET_SENTINEL};

/// Parsed view of the configuration file, read once at process start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DwhConfig {
    #[serde(default)]
    pub aws: AwsConfig,
    pub dwh: WarehouseConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub cluster: ConnectionConfig,
    #[serde(default)]
    pub iam_role: IamRoleConfig,
    pub s3: Option<S3Config>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsConfig {
    #[serde(default = "default_region")]
    pub region: String,
    /// Static credentials. When absent the SDK default chain is used.
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            access_key_id: None,
            secret_access_key: None,
        }
    }
}

/// `[dwh]`: desired cluster shape and the role it runs under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarehouseConfig {
    pub cluster_type: ClusterClass,
    pub num_nodes: u32,
    pub node_type: String,
    pub cluster_identifier: String,
    pub db: String,
    pub db_user: String,
    pub db_password: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub iam_role_name: String,
}

/// `[poll]`: readiness poller timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            max_wait_secs: default_max_wait_secs(),
        }
    }
}

impl PollConfig {
    /// Longest wait a single phase may be configured for.
    pub const MAX_WAIT_CEILING_SECS: u64 = 24 * 60 * 60;

    /// Interval of at least one second; wait of at most a day.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "[poll].interval_secs must be at least 1".into(),
            ));
        }
        if self.max_wait_secs == 0 || self.max_wait_secs > Self::MAX_WAIT_CEILING_SECS {
            return Err(ConfigError::Invalid(format!(
                "[poll].max_wait_secs must be between 1 and {}",
                Self::MAX_WAIT_CEILING_SECS
            )));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }
}

/// `[cluster]`: connection settings consumed by the ETL stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "sentinel")]
    pub host: String,
    #[serde(default)]
    pub db_name: String,
    #[serde(default)]
    pub db_user: String,
    #[serde(default)]
    pub db_password: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: sentinel(),
            db_name: String::new(),
            db_user: String::new(),
            db_password: String::new(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IamRoleConfig {
    #[serde(default = "sentinel")]
    pub arn: String,
}

impl Default for IamRoleConfig {
    fn default() -> Self {
        Self { arn: sentinel() }
    }
}

/// `[s3]`: source data locations for the staging load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    pub log_data: String,
    pub log_jsonpath: String,
    pub song_data: String,
}

impl DwhConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> ConfigResult<Self> {
        let config: DwhConfig = toml::from_str(content)?;
        config.poll.validate()?;
        Ok(config)
    }

    /// Build and validate the immutable cluster spec.
    pub fn cluster_spec(&self) -> ConfigResult<ClusterSpec> {
        let spec = ClusterSpec {
            identifier: self.dwh.cluster_identifier.clone(),
            node_type: self.dwh.node_type.clone(),
            node_count: self.dwh.num_nodes,
            class: self.dwh.cluster_type,
            db_name: self.dwh.db.clone(),
            master_user: self.dwh.db_user.clone(),
            master_password: self.dwh.db_password.clone(),
            port: self.dwh.port,
        };
        spec.validate()?;
        Ok(spec)
    }

    pub fn identity(&self) -> ConfigResult<IdentityDescriptor> {
        if self.dwh.iam_role_name.trim().is_empty() {
            return Err(ConfigError::MissingKey {
                section: "dwh".into(),
                key: "iam_role_name".into(),
            });
        }
        Ok(IdentityDescriptor::for_cluster_service(&self.dwh.iam_role_name))
    }

    /// The endpoint handoff as currently recorded in the file.
    pub fn persisted_endpoint(&self) -> PersistedEndpoint {
        PersistedEndpoint::new(&self.cluster.host, &self.iam_role.arn)
    }
}

fn default_region() -> String {
    "us-west-2".to_string()
}

fn default_port() -> u16 {
    5439
}

fn default_interval_secs() -> u64 {
    30
}

fn default_max_wait_secs() -> u64 {
    30 * 60
}

fn sentinel() -> String {
    UNSET_SENTINEL.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[dwh]
cluster_type = "multi-node"
num_nodes = 2
node_type = "small"
cluster_identifier = "test-cluster"
db = "dwh"
db_user = "dwhuser"
db_password = "Passw0rd"
iam_role_name = "dwhRole"
"#;

    #[test]
    fn parse_minimal_applies_defaults() {
        let config = DwhConfig::parse(MINIMAL).unwrap();
        assert_eq!(config.aws.region, "us-west-2");
        assert_eq!(config.dwh.port, 5439);
        assert_eq!(config.poll.interval(), Duration::from_secs(30));
        assert_eq!(config.poll.max_wait(), Duration::from_secs(1800));
        assert!(config.persisted_endpoint().is_unset());
        assert!(config.s3.is_none());
    }

    #[test]
    fn cluster_spec_from_config() {
        let config = DwhConfig::parse(MINIMAL).unwrap();
        let spec = config.cluster_spec().unwrap();
        assert_eq!(spec.identifier, "test-cluster");
        assert_eq!(spec.node_count, 2);
        assert_eq!(spec.class, ClusterClass::MultiNode);
        assert_eq!(spec.port, 5439);
    }

    #[test]
    fn invalid_spec_is_rejected() {
        let content = MINIMAL.replace("num_nodes = 2", "num_nodes = 0");
        let config = DwhConfig::parse(&content).unwrap();
        assert!(matches!(config.cluster_spec(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn missing_role_name_is_reported() {
        let content = MINIMAL.replace("iam_role_name = \"dwhRole\"", "iam_role_name = \"\"");
        let config = DwhConfig::parse(&content).unwrap();
        assert!(matches!(config.identity(), Err(ConfigError::MissingKey { .. })));
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let content = format!("{MINIMAL}\n[poll]\ninterval_secs = 0\n");
        assert!(matches!(
            DwhConfig::parse(&content),
            Err(ConfigError::Invalid(msg)) if msg.contains("interval_secs")
        ));
    }

    #[test]
    fn oversized_max_wait_is_rejected() {
        let content = format!("{MINIMAL}\n[poll]\nmax_wait_secs = 9223372036854775807\n");
        assert!(matches!(
            DwhConfig::parse(&content),
            Err(ConfigError::Invalid(msg)) if msg.contains("max_wait_secs")
        ));

        let ceiling = format!(
            "{MINIMAL}\n[poll]\nmax_wait_secs = {}\n",
            PollConfig::MAX_WAIT_CEILING_SECS
        );
        let config = DwhConfig::parse(&ceiling).unwrap();
        assert_eq!(config.poll.max_wait(), Duration::from_secs(86_400));
    }

    #[test]
    fn missing_dwh_section_fails_to_parse() {
        assert!(matches!(
            DwhConfig::parse("[aws]\nregion = \"eu-west-1\"\n"),
            Err(ConfigError::Parse(_))
        ));
    }
}
