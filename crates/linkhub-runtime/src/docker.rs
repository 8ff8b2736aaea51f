//! Docker implementation of the container runtime seam

use std::collections::HashMap;

use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, RemoveContainerOptions,
    StartContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::models::{
    ContainerStateStatusEnum, HostConfig, PortBinding, RestartPolicy as DockerRestartPolicy,
    RestartPolicyNameEnum,
};
use bollard::Docker;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::{
    log_spec, parse_env_list, parse_port_map, ContainerAttributes, ContainerHandle,
    ContainerRuntime, ContainerSpec, ContainerStatus, RestartPolicy, RuntimeError,
};

/// Container runtime backed by the local Docker daemon
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect using the platform's default socket (`/var/run/docker.sock`
    /// or the `DOCKER_HOST` environment variable).
    pub fn connect() -> Result<Self, RuntimeError> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker })
    }

    async fn inspect(
        &self,
        name: &str,
    ) -> Result<Option<bollard::models::ContainerInspectResponse>, RuntimeError> {
        match self
            .docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await
        {
            Ok(response) => Ok(Some(response)),
            Err(BollardError::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn to_docker_config(spec: &ContainerSpec) -> Config<String> {
    let env: Vec<String> = spec.env.iter().map(|(k, v)| format!("{}={}", k, v)).collect();

    let mut exposed_ports: HashMap<String, HashMap<(), ()>> = HashMap::new();
    let mut port_bindings: bollard::models::PortMap = HashMap::new();
    for port in &spec.ports {
        exposed_ports.insert(port.container_port.clone(), HashMap::new());
        // An empty HostPort asks the daemon for an ephemeral port.
        let host_port = port.host_port.map(|p| p.to_string()).unwrap_or_default();
        port_bindings.insert(
            port.container_port.clone(),
            Some(vec![PortBinding {
                host_ip: None,
                host_port: Some(host_port),
            }]),
        );
    }

    let restart_policy = DockerRestartPolicy {
        name: Some(match spec.restart_policy {
            RestartPolicy::Always => RestartPolicyNameEnum::ALWAYS,
            RestartPolicy::No => RestartPolicyNameEnum::NO,
        }),
        maximum_retry_count: None,
    };

    Config {
        image: Some(spec.image.clone()),
        env: Some(env),
        exposed_ports: Some(exposed_ports),
        tty: Some(true),
        open_stdin: Some(true),
        host_config: Some(HostConfig {
            port_bindings: Some(port_bindings),
            cap_add: Some(spec.cap_add.clone()),
            network_mode: Some(spec.network.clone()),
            restart_policy: Some(restart_policy),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn find(&self, name: &str) -> Result<Option<ContainerHandle>, RuntimeError> {
        let Some(response) = self.inspect(name).await? else {
            return Ok(None);
        };

        Ok(Some(ContainerHandle {
            id: response.id.unwrap_or_default(),
            name: name.to_string(),
        }))
    }

    async fn run(&self, spec: &ContainerSpec) -> Result<ContainerHandle, RuntimeError> {
        log_spec(spec);

        let created = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: spec.name.clone(),
                    platform: None,
                }),
                to_docker_config(spec),
            )
            .await?;

        self.docker
            .start_container(&spec.name, None::<StartContainerOptions<String>>)
            .await?;

        info!("Started container '{}' ({})", spec.name, created.id);
        Ok(ContainerHandle {
            id: created.id,
            name: spec.name.clone(),
        })
    }

    async fn attributes(&self, name: &str) -> Result<ContainerAttributes, RuntimeError> {
        let response = self
            .inspect(name)
            .await?
            .ok_or_else(|| RuntimeError::NotFound(name.to_string()))?;

        let status = match response.state.and_then(|s| s.status) {
            Some(ContainerStateStatusEnum::RUNNING) => ContainerStatus::Running,
            _ => ContainerStatus::NotRunning,
        };

        let host_ports = response
            .network_settings
            .and_then(|n| n.ports)
            .map(|p| parse_port_map(&p))
            .unwrap_or_default();

        let env = response
            .config
            .and_then(|c| c.env)
            .map(|e| parse_env_list(&e))
            .unwrap_or_default();

        debug!("Container '{}' status={:?}", name, status);
        Ok(ContainerAttributes {
            status,
            host_ports,
            env,
        })
    }

    async fn remove(&self, name: &str, force: bool) -> Result<(), RuntimeError> {
        self.docker
            .remove_container(
                name,
                Some(RemoveContainerOptions {
                    force,
                    ..Default::default()
                }),
            )
            .await?;

        info!("Removed container '{}'", name);
        Ok(())
    }
}
