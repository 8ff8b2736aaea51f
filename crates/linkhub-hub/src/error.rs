//! Hub error taxonomy
//!
//! User-input errors (domains) and external-tool failures surface
//! immediately with no retry. Record unreadability and config mismatch
//! never surface — the reconciler recovers by recreating the link.

use linkhub_domain::DomainError;
use linkhub_keys::KeyError;
use linkhub_runtime::RuntimeError;
use linkhub_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HubError {
    #[error(transparent)]
    InvalidDomain(#[from] DomainError),

    #[error("Key generation failed for link '{name}': {source}")]
    KeyGeneration {
        name: String,
        #[source]
        source: KeyError,
    },

    /// The container never reached the running state within the poll
    /// budget. The half-created container is left behind for inspection.
    #[error("Timeout exceeded waiting for link '{0}' to enter running state")]
    ProvisionTimeout(String),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Registrar(#[from] crate::RegistrarError),

    /// The running container did not report a host binding for one of its
    /// three fixed container-side ports.
    #[error("Link '{name}' is missing a host binding for port {port}")]
    MissingHostPort { name: String, port: String },
}
