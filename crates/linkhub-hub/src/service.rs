//! Hub service: single-link provisioning and restart-time bulk restore

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use linkhub_domain::compile_domain_regex;
use linkhub_keys::{KeyGenerator, KeyPair};
use linkhub_runtime::ContainerRuntime;
use linkhub_store::LinkConfigStore;
use serde::Serialize;
use tracing::{error, info};

use crate::reconciler::{
    host_port, DesiredLink, LinkReconciler, ReconcilerConfig, ReuseHint, ReusedPorts,
};
use crate::{
    HubError, ProxyRegistrar, UDP_PROXY_CONTAINER_PORT, UDP_PROXY_CONTAINER_PORT_2,
    WG_CONTAINER_PORT,
};

/// Hub configuration, passed in explicitly (no ambient globals)
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Public hostname or address of this hub, used in returned endpoints.
    pub public_host: String,
    /// Image reference for link containers.
    pub image: String,
    /// Docker network link containers attach to.
    pub network: String,
    /// Directory holding one config record per link.
    pub link_dir: PathBuf,
    /// True the first time the hub runs on this host.
    pub is_first_run: bool,
    /// Poll budget while waiting for a created container to run.
    pub poll_attempts: u32,
    pub poll_interval: Duration,
}

impl HubConfig {
    pub fn new(
        public_host: impl Into<String>,
        image: impl Into<String>,
        network: impl Into<String>,
        link_dir: impl Into<PathBuf>,
    ) -> Self {
        let link_dir = link_dir.into();
        let is_first_run = !link_dir.exists();
        Self {
            public_host: public_host.into(),
            image: image.into(),
            network: network.into(),
            link_dir,
            is_first_run,
            poll_attempts: 5,
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Connection info returned by a successful provisioning call
#[derive(Debug, Clone, Serialize)]
pub struct LinkEndpoints {
    pub link_wg_endpoint: String,
    pub link_udp_proxy_endpoint: String,
    pub link_udp_proxy_endpoint_2: String,
    pub link_wg_pubkey: String,
}

/// Outcome of a bulk restore pass. Per-link failures do not abort the
/// rest of the pass.
#[derive(Debug, Default)]
pub struct RestoreReport {
    pub restored: Vec<String>,
    pub failed: Vec<(String, HubError)>,
}

/// Orchestrates reconciliation for the CLI boundary
pub struct HubService {
    config: HubConfig,
    store: Arc<LinkConfigStore>,
    runtime: Arc<dyn ContainerRuntime>,
    registrar: Arc<dyn ProxyRegistrar>,
    reconciler: LinkReconciler,
}

impl HubService {
    pub fn new(
        config: HubConfig,
        runtime: Arc<dyn ContainerRuntime>,
        keygen: Arc<dyn KeyGenerator>,
        registrar: Arc<dyn ProxyRegistrar>,
    ) -> Self {
        let store = Arc::new(LinkConfigStore::new(&config.link_dir));
        let mut reconciler_config = ReconcilerConfig::new(&config.image, &config.network);
        reconciler_config.poll_attempts = config.poll_attempts;
        reconciler_config.poll_interval = config.poll_interval;

        let reconciler = LinkReconciler::new(
            Arc::clone(&runtime),
            keygen,
            Arc::clone(&store),
            reconciler_config,
        );

        Self {
            config,
            store,
            runtime,
            registrar,
            reconciler,
        }
    }

    pub fn store(&self) -> &LinkConfigStore {
        &self.store
    }

    /// First run: create the record directory. Subsequent runs: restore
    /// every persisted link, reusing its stored ports and keypair so the
    /// link keeps its external identity.
    pub async fn start_or_restore(&self) -> Result<RestoreReport, HubError> {
        if self.config.is_first_run {
            self.store.ensure_created()?;
            info!("First run: created link record directory");
            return Ok(RestoreReport::default());
        }

        let mut report = RestoreReport::default();
        for name in self.store.list_names()? {
            match self.restore_one(&name).await {
                Ok(()) => report.restored.push(name),
                Err(e) => {
                    error!("Failed to restore link '{}': {}", name, e);
                    report.failed.push((name, e));
                }
            }
        }

        info!(
            "Restore pass complete: {} restored, {} failed",
            report.restored.len(),
            report.failed.len()
        );
        Ok(report)
    }

    async fn restore_one(&self, name: &str) -> Result<(), HubError> {
        let record = self.store.read(name)?;
        let desired = DesiredLink {
            name: name.to_string(),
            domain_regex: record.domain_regex.clone(),
            remote_pub_key: record.remote_pub_key.clone(),
        };
        let hint = ReuseHint::Restore {
            ports: ReusedPorts {
                wg_port: record.wg_port,
                udp_proxy_port: record.udp_proxy_port,
                udp_proxy_port_2: record.udp_proxy_port_2,
            },
            keypair: KeyPair {
                private_key: record.link_wg_key,
                public_key: record.link_wg_pubkey,
            },
        };

        self.reconciler.reconcile(&desired, hint).await?;
        Ok(())
    }

    /// Provision (or converge) a single link and return its endpoints.
    ///
    /// Validates and compiles the domain set, reconciles the container,
    /// registers routing for the domain pattern, and reads the assigned
    /// host ports back from the running container.
    pub async fn provision_link(
        &self,
        name: &str,
        domains: &[String],
        remote_pub_key: &str,
    ) -> Result<LinkEndpoints, HubError> {
        let domain_regex = compile_domain_regex(domains)?;
        let desired = DesiredLink {
            name: name.to_string(),
            domain_regex: domain_regex.clone(),
            remote_pub_key: remote_pub_key.to_string(),
        };

        let reconciled = self.reconciler.reconcile(&desired, ReuseHint::Fresh).await?;

        let attrs = self.runtime.attributes(name).await?;
        let wg_port = host_port(&attrs, WG_CONTAINER_PORT, name)?;
        let udp_proxy_port = host_port(&attrs, UDP_PROXY_CONTAINER_PORT, name)?;
        let udp_proxy_port_2 = host_port(&attrs, UDP_PROXY_CONTAINER_PORT_2, name)?;

        self.registrar
            .register_stream_backend(name, &domain_regex, name)?;
        self.registrar
            .register_http_passthrough(name, &domain_regex, name)?;

        let host = &self.config.public_host;
        Ok(LinkEndpoints {
            link_wg_endpoint: format!("{}:{}", host, wg_port),
            link_udp_proxy_endpoint: format!("{}:{}", host, udp_proxy_port),
            link_udp_proxy_endpoint_2: format!("{}:{}", host, udp_proxy_port_2),
            link_wg_pubkey: reconciled.record.link_wg_pubkey,
        })
    }
}
