//! The link reconciliation state machine
//!
//! Evaluated fresh on every call: no in-memory state survives across
//! invocations. All durable state lives in the config store and the
//! container runtime. Per-name operations are assumed to be serialized by
//! the caller; distinct names may reconcile concurrently.

use std::sync::Arc;
use std::time::Duration;

use linkhub_keys::{KeyGenerator, KeyPair};
use linkhub_runtime::{
    ContainerAttributes, ContainerHandle, ContainerRuntime, ContainerSpec, PortRequest,
    RestartPolicy,
};
use linkhub_store::{LinkConfigRecord, LinkConfigStore, StoreError};
use tracing::{debug, info, warn};

use crate::{
    HubError, ENV_DOMAIN_REGEX, ENV_REMOTE_PUBKEY, ENV_ROLE, ENV_WG_KEY, ENV_WG_PUBKEY,
    LINK_ROLE, UDP_PROXY_CONTAINER_PORT, UDP_PROXY_CONTAINER_PORT_2, WG_CONTAINER_PORT,
};

/// Target configuration for one link, ephemeral per call
#[derive(Debug, Clone)]
pub struct DesiredLink {
    /// Link name; also the container name and the record filename.
    pub name: String,
    /// Compiled anchored alternation over the link's domain set.
    pub domain_regex: String,
    /// Public key of the remote peer.
    pub remote_pub_key: String,
}

/// Host ports carried over from a previous life of the link
#[derive(Debug, Clone, Default)]
pub struct ReusedPorts {
    pub wg_port: Option<u16>,
    pub udp_proxy_port: Option<u16>,
    pub udp_proxy_port_2: Option<u16>,
}

/// Whether a creation may reuse a prior identity.
///
/// The restart path passes `Restore` so a recreated link keeps its
/// external ports and keypair; every other creation mints fresh
/// credentials and lets the host assign ports.
#[derive(Debug, Clone)]
pub enum ReuseHint {
    Fresh,
    Restore { ports: ReusedPorts, keypair: KeyPair },
}

/// How the reconciler satisfied the desired spec
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Existing container and record already matched; nothing was touched.
    Matched,
    /// A container was created (possibly after removing a stale one).
    Created,
}

/// Result of a successful reconciliation
#[derive(Debug, Clone)]
pub struct ReconciledLink {
    pub handle: ContainerHandle,
    pub record: LinkConfigRecord,
    pub outcome: ReconcileOutcome,
}

/// Reconciler settings
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Image reference for link containers, e.g. "linkhub/link:v1".
    pub image: String,
    /// Docker network the link containers attach to.
    pub network: String,
    /// Poll attempts while waiting for a created container to run.
    pub poll_attempts: u32,
    /// Wait before each poll attempt.
    pub poll_interval: Duration,
}

impl ReconcilerConfig {
    pub fn new(image: impl Into<String>, network: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            network: network.into(),
            poll_attempts: 5,
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Converges a link's observed state onto a desired spec
pub struct LinkReconciler {
    runtime: Arc<dyn ContainerRuntime>,
    keygen: Arc<dyn KeyGenerator>,
    store: Arc<LinkConfigStore>,
    config: ReconcilerConfig,
}

impl LinkReconciler {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        keygen: Arc<dyn KeyGenerator>,
        store: Arc<LinkConfigStore>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            runtime,
            keygen,
            store,
            config,
        }
    }

    /// Produce a running container whose observed configuration matches
    /// `desired`.
    ///
    /// An existing container survives only if its persisted record is
    /// readable and agrees with `desired` on `(domain_regex,
    /// remote_pub_key)`; otherwise it is force-removed and recreated with
    /// a fresh keypair and host-assigned ports. `hint` only applies when
    /// no container exists at all (the restart path).
    pub async fn reconcile(
        &self,
        desired: &DesiredLink,
        hint: ReuseHint,
    ) -> Result<ReconciledLink, HubError> {
        let name = &desired.name;

        let Some(handle) = self.runtime.find(name).await? else {
            debug!("Link '{}': no container, creating", name);
            return self.create(desired, hint).await;
        };

        let record = match self.store.read(name) {
            Ok(record) => record,
            Err(StoreError::NotFound(_)) | Err(StoreError::Corrupt { .. }) => {
                // No usable record: the container's provenance is unknown.
                warn!("Link '{}': container exists but record is unusable, recreating", name);
                self.runtime.remove(name, true).await?;
                return self.create(desired, ReuseHint::Fresh).await;
            }
            Err(e) => return Err(e.into()),
        };

        if record.matches(&desired.domain_regex, &desired.remote_pub_key) {
            debug!("Link '{}': config matches, leaving untouched", name);
            return Ok(ReconciledLink {
                handle,
                record,
                outcome: ReconcileOutcome::Matched,
            });
        }

        info!("Link '{}': config diverged, recreating", name);
        self.runtime.remove(name, true).await?;
        self.create(desired, ReuseHint::Fresh).await
    }

    /// Create-and-run, then poll until running and persist the record.
    ///
    /// Any removal has already completed, so the name is free. On timeout
    /// the non-running container is deliberately left in place and no
    /// record is written.
    async fn create(
        &self,
        desired: &DesiredLink,
        hint: ReuseHint,
    ) -> Result<ReconciledLink, HubError> {
        let name = &desired.name;

        let (keypair, ports) = match hint {
            ReuseHint::Fresh => {
                let keypair =
                    self.keygen
                        .generate()
                        .await
                        .map_err(|source| HubError::KeyGeneration {
                            name: name.clone(),
                            source,
                        })?;
                (keypair, ReusedPorts::default())
            }
            ReuseHint::Restore { ports, keypair } => (keypair, ports),
        };

        let spec = ContainerSpec {
            name: name.clone(),
            image: self.config.image.clone(),
            ports: vec![
                PortRequest::new(WG_CONTAINER_PORT, ports.wg_port),
                PortRequest::new(UDP_PROXY_CONTAINER_PORT, ports.udp_proxy_port),
                PortRequest::new(UDP_PROXY_CONTAINER_PORT_2, ports.udp_proxy_port_2),
            ],
            env: vec![
                (ENV_ROLE.to_string(), LINK_ROLE.to_string()),
                (ENV_DOMAIN_REGEX.to_string(), desired.domain_regex.clone()),
                (ENV_REMOTE_PUBKEY.to_string(), desired.remote_pub_key.clone()),
                (ENV_WG_KEY.to_string(), keypair.private_key.clone()),
                (ENV_WG_PUBKEY.to_string(), keypair.public_key.clone()),
            ],
            cap_add: vec!["NET_ADMIN".to_string()],
            network: self.config.network.clone(),
            restart_policy: RestartPolicy::Always,
        };

        let handle = self.runtime.run(&spec).await?;

        for attempt in 1..=self.config.poll_attempts {
            tokio::time::sleep(self.config.poll_interval).await;

            let attrs = self.runtime.attributes(name).await?;
            if !attrs.status.is_running() {
                debug!(
                    "Link '{}': not running yet (attempt {}/{})",
                    name, attempt, self.config.poll_attempts
                );
                continue;
            }

            let record = LinkConfigRecord {
                name: name.clone(),
                domain_regex: desired.domain_regex.clone(),
                remote_pub_key: desired.remote_pub_key.clone(),
                link_wg_key: keypair.private_key.clone(),
                link_wg_pubkey: keypair.public_key.clone(),
                wg_port: Some(host_port(&attrs, WG_CONTAINER_PORT, name)?),
                udp_proxy_port: Some(host_port(&attrs, UDP_PROXY_CONTAINER_PORT, name)?),
                udp_proxy_port_2: Some(host_port(&attrs, UDP_PROXY_CONTAINER_PORT_2, name)?),
            };
            self.store.write(&record)?;

            info!("Link '{}' is running (wg port {:?})", name, record.wg_port);
            return Ok(ReconciledLink {
                handle,
                record,
                outcome: ReconcileOutcome::Created,
            });
        }

        Err(HubError::ProvisionTimeout(name.clone()))
    }
}

/// Read one assigned host port out of the container attributes.
pub(crate) fn host_port(
    attrs: &ContainerAttributes,
    container_port: &str,
    name: &str,
) -> Result<u16, HubError> {
    attrs
        .host_ports
        .get(container_port)
        .copied()
        .ok_or_else(|| HubError::MissingHostPort {
            name: name.to_string(),
            port: container_port.to_string(),
        })
}
