//! Node identity and peer addressing

use serde::Deserialize;

/// Role this process plays on the bus
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// Instrumented application publishing values (default)
    #[default]
    Client,
    /// Per-node aggregator mirroring client publications
    Daemon,
    /// Cluster-wide aggregator fed by daemons
    Leader,
    /// Inspection/steering tooling
    Control,
}

impl NodeRole {
    /// Get the string name of this role
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Daemon => "daemon",
            Self::Leader => "leader",
            Self::Control => "control",
        }
    }
}

/// Address of the next aggregation tier
///
/// For a client this is its node-local daemon; for a daemon it is the
/// cluster leader. Leaders have no upstream.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct UpstreamConfig {
    /// Peer hostname or address
    pub host: String,

    /// Peer port
    pub port: u16,
}

impl UpstreamConfig {
    /// host:port form for connecting
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Node configuration
///
/// # Example
///
/// ```toml
/// [node]
/// role = "daemon"
/// node_id = "compute-17"
/// listen_port = 22500
///
/// [node.upstream]
/// host = "leader.cluster"
/// port = 22501
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Role on the bus
    /// Default: client
    pub role: NodeRole,

    /// Node identifier reported in publication origins
    /// Default: the machine hostname, "unknown" if unavailable
    pub node_id: String,

    /// Bind address for daemon/leader listeners
    /// Default: "0.0.0.0"
    pub listen_address: String,

    /// Listen port for daemon/leader roles, 0 means ephemeral
    /// Default: 22500
    pub listen_port: u16,

    /// Next aggregation tier, if any
    pub upstream: Option<UpstreamConfig>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            role: NodeRole::Client,
            node_id: default_node_id(),
            listen_address: "0.0.0.0".into(),
            listen_port: 22500,
            upstream: None,
        }
    }
}

impl NodeConfig {
    /// listen_address:listen_port form for binding
    pub fn listen_on(&self) -> String {
        format!("{}:{}", self.listen_address, self.listen_port)
    }
}

/// Best-effort machine hostname
fn default_node_id() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = NodeConfig::default();
        assert_eq!(config.role, NodeRole::Client);
        assert_eq!(config.listen_address, "0.0.0.0");
        assert_eq!(config.listen_port, 22500);
        assert!(config.upstream.is_none());
    }

    #[test]
    fn test_deserialize_roles() {
        for (s, expected) in [
            ("client", NodeRole::Client),
            ("daemon", NodeRole::Daemon),
            ("leader", NodeRole::Leader),
            ("control", NodeRole::Control),
        ] {
            let toml = format!("role = \"{}\"", s);
            let config: NodeConfig = toml::from_str(&toml).unwrap();
            assert_eq!(config.role, expected);
        }
    }

    #[test]
    fn test_upstream_address() {
        let config: NodeConfig = toml::from_str(
            "role = \"daemon\"\n[upstream]\nhost = \"leader\"\nport = 9000",
        )
        .unwrap();
        assert_eq!(config.upstream.unwrap().address(), "leader:9000");
    }

    #[test]
    fn test_listen_on() {
        let config: NodeConfig =
            toml::from_str("listen_address = \"127.0.0.1\"\nlisten_port = 1234").unwrap();
        assert_eq!(config.listen_on(), "127.0.0.1:1234");
    }
}
