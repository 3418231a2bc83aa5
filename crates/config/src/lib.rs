//! Configuration schema and loader for the tierkv client and replica.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;
use tierkv_common::{ConflictPolicy, ConsistencyTier, Endpoint};

/// Client session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server host used when no explicit replica list is given.
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port used when no explicit replica list is given.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Identity this client stamps into version vectors.
    #[serde(default = "default_node_id")]
    pub node_id: String,

    /// Replica endpoints. Empty means `[host:port]`.
    #[serde(default)]
    pub replicas: Vec<Endpoint>,

    /// Read consistency level.
    #[serde(default = "default_level")]
    pub read_level: ConsistencyTier,

    /// Write consistency level.
    #[serde(default = "default_level")]
    pub write_level: ConsistencyTier,

    /// Read deadline in milliseconds.
    #[serde(default = "default_op_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Write deadline in milliseconds.
    #[serde(default = "default_op_timeout_ms")]
    pub write_timeout_ms: u64,

    /// Per-replica deadline for `stat` in milliseconds.
    #[serde(default = "default_stat_timeout_ms")]
    pub stat_timeout_ms: u64,

    /// TCP dial deadline in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Resolution of concurrent read results.
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            node_id: default_node_id(),
            replicas: Vec::new(),
            read_level: default_level(),
            write_level: default_level(),
            read_timeout_ms: default_op_timeout_ms(),
            write_timeout_ms: default_op_timeout_ms(),
            stat_timeout_ms: default_stat_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            conflict_policy: ConflictPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// The replica set: explicit `replicas`, or the single `host:port` server.
    pub fn replica_set(&self) -> Vec<Endpoint> {
        if self.replicas.is_empty() {
            vec![Endpoint::new(self.host.clone(), self.port)]
        } else {
            self.replicas.clone()
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn stat_timeout(&self) -> Duration {
        Duration::from_millis(self.stat_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Validate that configuration values are consistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid("host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid("port must be > 0".into()));
        }
        if self.node_id.trim().is_empty() {
            return Err(ConfigError::Invalid("node_id must not be empty".into()));
        }
        for (name, value) in [
            ("read_timeout_ms", self.read_timeout_ms),
            ("write_timeout_ms", self.write_timeout_ms),
            ("stat_timeout_ms", self.stat_timeout_ms),
            ("connect_timeout_ms", self.connect_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be > 0", name)));
            }
        }
        let mut seen = HashSet::new();
        for endpoint in &self.replicas {
            if endpoint.port() == 0 {
                return Err(ConfigError::Invalid(format!(
                    "replica {} has port 0",
                    endpoint
                )));
            }
            if !seen.insert(endpoint) {
                return Err(ConfigError::Invalid(format!(
                    "replica {} listed twice",
                    endpoint
                )));
            }
        }
        Ok(())
    }
}

/// Configuration for a `tierkv-replica` process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicaConfig {
    /// Address the replica listens on.
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

// --- Defaults ---

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 7000;

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_node_id() -> String {
    format!("client-{}", uuid::Uuid::new_v4())
}
fn default_level() -> ConsistencyTier {
    ConsistencyTier::Quorum
}
fn default_op_timeout_ms() -> u64 {
    5000
}
fn default_stat_timeout_ms() -> u64 {
    2000
}
fn default_connect_timeout_ms() -> u64 {
    1000
}
fn default_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT))
}

// --- Loading ---

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Load a `ClientConfig` from a YAML file path.
pub fn load_from_file(path: &std::path::Path) -> Result<ClientConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    load_from_str(&contents)
}

/// Load a `ClientConfig` from a YAML string.
pub fn load_from_str(yaml: &str) -> Result<ClientConfig, ConfigError> {
    let config: ClientConfig = serde_yaml::from_str(yaml)?;
    config.validate()?;
    Ok(config)
}

/// Load a `ReplicaConfig` from a YAML file path.
pub fn load_replica_from_file(path: &std::path::Path) -> Result<ReplicaConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&contents)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_from_empty_document() {
        let config = load_from_str("{}").unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 7000);
        assert_eq!(config.read_level, ConsistencyTier::Quorum);
        assert_eq!(config.write_level, ConsistencyTier::Quorum);
        assert_eq!(config.conflict_policy, ConflictPolicy::Surface);
        assert!(config.node_id.starts_with("client-"));
        assert_eq!(config.replica_set(), vec![Endpoint::new("127.0.0.1", 7000)]);
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
host: 10.0.0.1
port: 8000
node_id: laptop
replicas:
  - "10.0.0.1:8000"
  - "10.0.0.2:8000"
  - "10.0.0.3:8000"
read_level: one
write_level: ALL
read_timeout_ms: 250
write_timeout_ms: 750
conflict_policy: highest_node
"#;
        let config = load_from_str(yaml).unwrap();
        assert_eq!(config.node_id, "laptop");
        assert_eq!(config.replica_set().len(), 3);
        assert_eq!(config.read_level, ConsistencyTier::One);
        assert_eq!(config.write_level, ConsistencyTier::All);
        assert_eq!(config.read_timeout(), Duration::from_millis(250));
        assert_eq!(config.write_timeout(), Duration::from_millis(750));
        assert_eq!(config.stat_timeout(), Duration::from_millis(2000));
        assert_eq!(config.conflict_policy, ConflictPolicy::HighestNode);
    }

    #[test]
    fn test_roundtrip_yaml() {
        let config = load_from_str("node_id: n1\nport: 7100\n").unwrap();
        let serialized = serde_yaml::to_string(&config).unwrap();
        let config2 = load_from_str(&serialized).unwrap();
        assert_eq!(config2.node_id, "n1");
        assert_eq!(config2.port, 7100);
    }

    #[test]
    fn test_rejects_zero_port() {
        let err = load_from_str("port: 0\n").unwrap_err().to_string();
        assert!(err.contains("port"), "error should mention port: {}", err);
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let err = load_from_str("write_timeout_ms: 0\n")
            .unwrap_err()
            .to_string();
        assert!(
            err.contains("write_timeout_ms"),
            "error should mention write_timeout_ms: {}",
            err
        );
    }

    #[test]
    fn test_rejects_duplicate_replicas() {
        let yaml = r#"
replicas:
  - "127.0.0.1:7000"
  - "127.0.0.1:7000"
"#;
        let err = load_from_str(yaml).unwrap_err().to_string();
        assert!(err.contains("listed twice"), "unexpected error: {}", err);
    }

    #[test]
    fn test_rejects_malformed_replica() {
        let yaml = "replicas:\n  - \"no-port\"\n";
        assert!(matches!(load_from_str(yaml), Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn test_rejects_unknown_level() {
        assert!(load_from_str("read_level: MOST\n").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port: 7300\nread_level: ALL").unwrap();
        let config = load_from_file(file.path()).unwrap();
        assert_eq!(config.port, 7300);
        assert_eq!(config.read_level, ConsistencyTier::All);
    }

    #[test]
    fn test_load_missing_file() {
        let result = load_from_file(std::path::Path::new("/nonexistent/tierkv.yaml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_replica_config_default_listen() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{{}}").unwrap();
        let config = load_replica_from_file(file.path()).unwrap();
        assert_eq!(config.listen.port(), 7000);
    }
}
