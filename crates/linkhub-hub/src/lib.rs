//! Link reconciliation engine
//!
//! The hub provisions and maintains "link" nodes: containers exposing a
//! WireGuard tunnel port and two UDP proxy ports, routed by domain name.
//! Given a link name and a desired configuration, the reconciler decides
//! whether the backing container already satisfies it and, if not,
//! destroys and recreates it with fresh credentials and port bindings,
//! then durably records the outcome so links survive a host restart.

mod error;
mod reconciler;
mod registrar;
mod service;

pub use error::HubError;
pub use reconciler::{
    DesiredLink, LinkReconciler, ReconcileOutcome, ReconciledLink, ReconcilerConfig, ReuseHint,
    ReusedPorts,
};
pub use registrar::{ProxyRegistrar, RegistrarError, RouteTable};
pub use service::{HubConfig, HubService, LinkEndpoints, RestoreReport};

/// Container-side tunnel port, fixed across all link images.
pub const WG_CONTAINER_PORT: &str = "18521/udp";
/// Container-side UDP proxy ports.
pub const UDP_PROXY_CONTAINER_PORT: &str = "18522/udp";
pub const UDP_PROXY_CONTAINER_PORT_2: &str = "18523/udp";

/// Environment handed to every link container.
pub const ENV_ROLE: &str = "LINKHUB_ROLE";
pub const ENV_DOMAIN_REGEX: &str = "LINKHUB_DOMAIN_REGEX";
pub const ENV_REMOTE_PUBKEY: &str = "LINKHUB_REMOTE_PUBKEY";
pub const ENV_WG_KEY: &str = "LINK_WG_KEY";
pub const ENV_WG_PUBKEY: &str = "LINK_WG_PUBKEY";

pub const LINK_ROLE: &str = "link";
