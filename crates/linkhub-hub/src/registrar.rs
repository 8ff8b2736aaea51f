//! Proxy registrar seam and in-memory route table
//!
//! Once a link is confirmed reachable, its domain pattern is wired into
//! the routing layer: a TLS stream backend for tunnel traffic and an HTTP
//! passthrough for plain requests. The routing controller itself is an
//! external collaborator; [`RouteTable`] is the in-process implementation
//! used by the hub and by tests.

use dashmap::DashMap;
use thiserror::Error;

/// Errors from route registration
#[derive(Debug, Error)]
pub enum RegistrarError {
    #[error("Route registration failed for '{name}': {reason}")]
    Registration { name: String, reason: String },
}

/// Routing registration consumed by the hub after a link is reachable
pub trait ProxyRegistrar: Send + Sync {
    /// Route TLS streams whose SNI matches `domain_regex` to `backend`.
    fn register_stream_backend(
        &self,
        name: &str,
        domain_regex: &str,
        backend: &str,
    ) -> Result<(), RegistrarError>;

    /// Route plain HTTP requests whose host matches `domain_regex` to
    /// `backend`.
    fn register_http_passthrough(
        &self,
        name: &str,
        domain_regex: &str,
        backend: &str,
    ) -> Result<(), RegistrarError>;
}

/// A registered route
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub domain_regex: String,
    pub backend: String,
}

/// In-memory route table keyed by link name.
///
/// Re-registering a name replaces its entry, so reprovisioning a link
/// never duplicates routes.
#[derive(Default)]
pub struct RouteTable {
    stream_routes: DashMap<String, RouteEntry>,
    http_routes: DashMap<String, RouteEntry>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stream_route(&self, name: &str) -> Option<RouteEntry> {
        self.stream_routes.get(name).map(|e| e.clone())
    }

    pub fn http_route(&self, name: &str) -> Option<RouteEntry> {
        self.http_routes.get(name).map(|e| e.clone())
    }

    pub fn stream_len(&self) -> usize {
        self.stream_routes.len()
    }

    pub fn http_len(&self) -> usize {
        self.http_routes.len()
    }
}

impl ProxyRegistrar for RouteTable {
    fn register_stream_backend(
        &self,
        name: &str,
        domain_regex: &str,
        backend: &str,
    ) -> Result<(), RegistrarError> {
        self.stream_routes.insert(
            name.to_string(),
            RouteEntry {
                domain_regex: domain_regex.to_string(),
                backend: backend.to_string(),
            },
        );
        Ok(())
    }

    fn register_http_passthrough(
        &self,
        name: &str,
        domain_regex: &str,
        backend: &str,
    ) -> Result<(), RegistrarError> {
        self.http_routes.insert(
            name.to_string(),
            RouteEntry {
                domain_regex: domain_regex.to_string(),
                backend: backend.to_string(),
            },
        );
        Ok(())
    }
}
