//! Test doubles for the reconciliation engine: an in-memory container
//! runtime, a counting key generator, and helpers to build a hub service
//! over a temp directory.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use linkhub_hub::{HubConfig, HubService, RouteTable};
use linkhub_keys::{KeyError, KeyGenerator, KeyPair};
use linkhub_runtime::{
    ContainerAttributes, ContainerHandle, ContainerRuntime, ContainerSpec, ContainerStatus,
    RuntimeError,
};
use tempfile::TempDir;

struct FakeContainer {
    spec: ContainerSpec,
    host_ports: HashMap<String, u16>,
}

/// In-memory container runtime. Containers report running as soon as they
/// are started unless the runtime was built with [`FakeRuntime::never_running`].
pub struct FakeRuntime {
    containers: Mutex<HashMap<String, FakeContainer>>,
    run_specs: Mutex<Vec<ContainerSpec>>,
    removed: Mutex<Vec<String>>,
    fail_find: Mutex<HashSet<String>>,
    next_port: AtomicU16,
    running: bool,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self {
            containers: Mutex::new(HashMap::new()),
            run_specs: Mutex::new(Vec::new()),
            removed: Mutex::new(Vec::new()),
            fail_find: Mutex::new(HashSet::new()),
            next_port: AtomicU16::new(41000),
            running: true,
        }
    }

    /// A runtime whose containers never reach the running state.
    pub fn never_running() -> Self {
        Self {
            running: false,
            ..Self::new()
        }
    }

    /// Make `find` fail for `name` (simulates a broken runtime).
    pub fn fail_find_for(&self, name: &str) {
        self.fail_find.lock().unwrap().insert(name.to_string());
    }

    pub fn run_count(&self) -> usize {
        self.run_specs.lock().unwrap().len()
    }

    pub fn run_specs(&self) -> Vec<ContainerSpec> {
        self.run_specs.lock().unwrap().clone()
    }

    pub fn removed(&self) -> Vec<String> {
        self.removed.lock().unwrap().clone()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.containers.lock().unwrap().contains_key(name)
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn find(&self, name: &str) -> Result<Option<ContainerHandle>, RuntimeError> {
        if self.fail_find.lock().unwrap().contains(name) {
            return Err(RuntimeError::NotFound(name.to_string()));
        }
        Ok(self
            .containers
            .lock()
            .unwrap()
            .get(name)
            .map(|c| ContainerHandle {
                id: format!("id-{}", c.spec.name),
                name: name.to_string(),
            }))
    }

    async fn run(&self, spec: &ContainerSpec) -> Result<ContainerHandle, RuntimeError> {
        let mut host_ports = HashMap::new();
        for port in &spec.ports {
            let assigned = port
                .host_port
                .unwrap_or_else(|| self.next_port.fetch_add(1, Ordering::SeqCst));
            host_ports.insert(port.container_port.clone(), assigned);
        }

        self.run_specs.lock().unwrap().push(spec.clone());
        self.containers.lock().unwrap().insert(
            spec.name.clone(),
            FakeContainer {
                spec: spec.clone(),
                host_ports,
            },
        );

        Ok(ContainerHandle {
            id: format!("id-{}", spec.name),
            name: spec.name.clone(),
        })
    }

    async fn attributes(&self, name: &str) -> Result<ContainerAttributes, RuntimeError> {
        let containers = self.containers.lock().unwrap();
        let container = containers
            .get(name)
            .ok_or_else(|| RuntimeError::NotFound(name.to_string()))?;

        Ok(ContainerAttributes {
            status: if self.running {
                ContainerStatus::Running
            } else {
                ContainerStatus::NotRunning
            },
            host_ports: container.host_ports.clone(),
            env: container.spec.env.iter().cloned().collect(),
        })
    }

    async fn remove(&self, name: &str, _force: bool) -> Result<(), RuntimeError> {
        self.containers.lock().unwrap().remove(name);
        self.removed.lock().unwrap().push(name.to_string());
        Ok(())
    }
}

/// Key generator returning PRIVKEY0/GENPUB0, PRIVKEY1/GENPUB1, ...
pub struct FakeKeygen {
    count: AtomicUsize,
}

impl FakeKeygen {
    pub fn new() -> Self {
        Self {
            count: AtomicUsize::new(0),
        }
    }

    pub fn generated(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyGenerator for FakeKeygen {
    async fn generate(&self) -> Result<KeyPair, KeyError> {
        let n = self.count.fetch_add(1, Ordering::SeqCst);
        Ok(KeyPair {
            private_key: format!("PRIVKEY{}", n),
            public_key: format!("GENPUB{}", n),
        })
    }
}

pub struct TestHub {
    pub service: HubService,
    pub runtime: Arc<FakeRuntime>,
    pub keygen: Arc<FakeKeygen>,
    pub routes: Arc<RouteTable>,
    pub temp: TempDir,
}

/// Build a hub over a fresh temp directory. The link record directory is
/// `<temp>/links` and does not exist yet, so the first
/// `start_or_restore` call takes the first-run path.
pub fn test_hub(runtime: FakeRuntime) -> TestHub {
    test_hub_in(TempDir::new().unwrap(), Arc::new(runtime))
}

/// Build a hub over an existing temp directory (simulates a process
/// restart against the same record directory).
pub fn test_hub_in(temp: TempDir, runtime: Arc<FakeRuntime>) -> TestHub {
    let keygen = Arc::new(FakeKeygen::new());
    let routes = Arc::new(RouteTable::new());

    let mut config = HubConfig::new(
        "hub.example.com",
        "linkhub/link:v1",
        "linkhub",
        temp.path().join("links"),
    );
    config.poll_attempts = 5;
    config.poll_interval = Duration::from_millis(1);

    let service = HubService::new(
        config,
        Arc::clone(&runtime) as Arc<dyn ContainerRuntime>,
        Arc::clone(&keygen) as Arc<dyn KeyGenerator>,
        Arc::clone(&routes) as Arc<dyn linkhub_hub::ProxyRegistrar>,
    );

    TestHub {
        service,
        runtime,
        keygen,
        routes,
        temp,
    }
}
