//! Container lifecycle adapter
//!
//! Thin seam over the container runtime: the reconciler only needs
//! {find, run, attributes, remove}, expressed by [`ContainerRuntime`].
//! [`DockerRuntime`] implements the trait against the Docker API.
//! Container start is asynchronous — the handle returned by `run` may not
//! be in the running state yet; callers poll `attributes` until it is.

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

mod docker;

pub use docker::DockerRuntime;

/// Errors from the container runtime
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Container runtime error: {0}")]
    Api(#[from] bollard::errors::Error),

    #[error("Container '{0}' not found")]
    NotFound(String),
}

/// Reference to a container managed by the runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    pub id: String,
    pub name: String,
}

/// Observed container status, folded down to what the reconciler needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerStatus {
    Running,
    /// Created, restarting, paused, exited — anything that is not running.
    NotRunning,
}

impl ContainerStatus {
    pub fn is_running(self) -> bool {
        matches!(self, ContainerStatus::Running)
    }
}

/// Live attributes of a container, re-fetched on every call
#[derive(Debug, Clone)]
pub struct ContainerAttributes {
    pub status: ContainerStatus,
    /// Assigned host port per container-side port key (e.g. "18521/udp").
    pub host_ports: HashMap<String, u16>,
    pub env: HashMap<String, String>,
}

/// One container-side port and its requested host binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortRequest {
    /// Container-side port key in Docker notation, e.g. "18521/udp".
    pub container_port: String,
    /// Pinned host port, or `None` to let the host assign one.
    pub host_port: Option<u16>,
}

impl PortRequest {
    pub fn new(container_port: impl Into<String>, host_port: Option<u16>) -> Self {
        Self {
            container_port: container_port.into(),
            host_port,
        }
    }
}

/// Restart policy applied to a created container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartPolicy {
    Always,
    No,
}

/// Everything needed to create and start a container
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub ports: Vec<PortRequest>,
    pub env: Vec<(String, String)>,
    pub cap_add: Vec<String>,
    pub network: String,
    pub restart_policy: RestartPolicy,
}

/// Seam over the container runtime consumed by the reconciler
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Look up a container by name.
    async fn find(&self, name: &str) -> Result<Option<ContainerHandle>, RuntimeError>;

    /// Create and start a container. Asynchronous: the container may not
    /// have reached the running state when this returns.
    async fn run(&self, spec: &ContainerSpec) -> Result<ContainerHandle, RuntimeError>;

    /// Fetch the live attributes of a container by name.
    async fn attributes(&self, name: &str) -> Result<ContainerAttributes, RuntimeError>;

    /// Remove a container by name.
    async fn remove(&self, name: &str, force: bool) -> Result<(), RuntimeError>;
}

/// Flatten Docker's port map into `container port key -> host port`.
///
/// Docker reports an optional list of bindings per exposed port; the first
/// binding with a parseable host port wins. Ports without a binding (not
/// published, or container not started yet) are omitted.
pub fn parse_port_map(ports: &bollard::models::PortMap) -> HashMap<String, u16> {
    let mut out = HashMap::new();
    for (key, bindings) in ports {
        let Some(bindings) = bindings else { continue };
        let host_port = bindings
            .iter()
            .filter_map(|b| b.host_port.as_deref())
            .find_map(|p| p.parse::<u16>().ok());
        if let Some(port) = host_port {
            out.insert(key.clone(), port);
        }
    }
    out
}

/// Parse Docker's `KEY=VALUE` env list into a map. Entries without `=`
/// are skipped.
pub fn parse_env_list(env: &[String]) -> HashMap<String, String> {
    env.iter()
        .filter_map(|entry| {
            entry
                .split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
        })
        .collect()
}

pub(crate) fn log_spec(spec: &ContainerSpec) {
    debug!(
        "Container spec: name={} image={} network={} ports={:?}",
        spec.name, spec.image, spec.network, spec.ports
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use bollard::models::PortBinding;

    #[test]
    fn test_parse_port_map() {
        let mut ports = bollard::models::PortMap::new();
        ports.insert(
            "18521/udp".to_string(),
            Some(vec![PortBinding {
                host_ip: Some("0.0.0.0".to_string()),
                host_port: Some("40001".to_string()),
            }]),
        );
        ports.insert("18522/udp".to_string(), None); // exposed, not published

        let parsed = parse_port_map(&ports);
        assert_eq!(parsed.get("18521/udp"), Some(&40001));
        assert!(!parsed.contains_key("18522/udp"));
    }

    #[test]
    fn test_parse_port_map_skips_unparseable_bindings() {
        let mut ports = bollard::models::PortMap::new();
        ports.insert(
            "18521/udp".to_string(),
            Some(vec![
                PortBinding {
                    host_ip: Some("::".to_string()),
                    host_port: Some("".to_string()),
                },
                PortBinding {
                    host_ip: Some("0.0.0.0".to_string()),
                    host_port: Some("40001".to_string()),
                },
            ]),
        );

        assert_eq!(parse_port_map(&ports).get("18521/udp"), Some(&40001));
    }

    #[test]
    fn test_parse_env_list() {
        let env = vec![
            "LINKHUB_ROLE=link".to_string(),
            "LINK_WG_PUBKEY=abc=def".to_string(), // value may contain '='
            "MALFORMED".to_string(),
        ];

        let parsed = parse_env_list(&env);
        assert_eq!(parsed.get("LINKHUB_ROLE").map(String::as_str), Some("link"));
        assert_eq!(
            parsed.get("LINK_WG_PUBKEY").map(String::as_str),
            Some("abc=def")
        );
        assert_eq!(parsed.len(), 2);
    }
}
