use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, LogsOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::models::{HostConfig, PortBinding};
use futures::StreamExt;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::EngineConfig;
use crate::engine::{EngineEndpoint, EngineRuntime};
use crate::errors::DastError;

/// Port the engine listens on inside the container.
const ENGINE_CONTAINER_PORT: &str = "8080/tcp";
const ENGINE_WORKDIR: &str = "/zap/wrk";

#[derive(Debug, Clone, PartialEq)]
pub enum ContainerStatus {
    Running,
    Stopped,
    NotFound,
}

/// Runs the engine as a local Docker container with its API published on
/// the loopback interface only.
pub struct DockerRuntime {
    docker: Docker,
    image: String,
    container_name: String,
    host_port: u16,
    workspace: PathBuf,
}

impl DockerRuntime {
    pub fn new(config: &EngineConfig, scan_id: &str) -> Result<Self, DastError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| DastError::Container(format!("Failed to connect to Docker: {}", e)))?;

        Ok(Self {
            docker,
            image: config.image.clone(),
            container_name: config.container_name.clone(),
            host_port: config.host_port,
            workspace: std::env::temp_dir().join(format!("dastctl-{}", scan_id)),
        })
    }

    /// Connect for `dastctl stop`, which only needs the container name.
    pub fn for_container(container_name: &str) -> Result<Self, DastError> {
        let config = EngineConfig { container_name: container_name.to_string(), ..Default::default() };
        Self::new(&config, "stop")
    }

    pub fn container_name(&self) -> &str {
        &self.container_name
    }

    pub async fn status(&self) -> ContainerStatus {
        let mut filters = HashMap::new();
        filters.insert("name".to_string(), vec![self.container_name.clone()]);

        let options = ListContainersOptions {
            all: true,
            filters,
            ..Default::default()
        };

        match self.docker.list_containers(Some(options)).await {
            Ok(containers) => {
                let target = format!("/{}", self.container_name);
                for container in &containers {
                    if let Some(names) = &container.names {
                        if names.iter().any(|n| n == &target) {
                            return match container.state.as_deref() {
                                Some("running") => ContainerStatus::Running,
                                _ => ContainerStatus::Stopped,
                            };
                        }
                    }
                }
                ContainerStatus::NotFound
            }
            Err(e) => {
                warn!(error = %e, "Failed to list containers");
                ContainerStatus::NotFound
            }
        }
    }

    async fn ensure_image(&self) -> Result<(), DastError> {
        match self.docker.inspect_image(&self.image).await {
            Ok(_) => {
                debug!(image = %self.image, "Engine image found locally");
                Ok(())
            }
            Err(_) => Err(DastError::Container(format!(
                "Engine image '{}' not found. Pull it with: docker pull {}",
                self.image, self.image
            ))),
        }
    }

    fn engine_command() -> Vec<String> {
        [
            "zap.sh",
            "-daemon",
            "-host",
            "0.0.0.0",
            "-port",
            "8080",
            "-config",
            "api.disablekey=true",
            "-config",
            "api.addrs.addr.name=.*",
            "-config",
            "api.addrs.addr.regex=true",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    async fn create_and_start(&self) -> Result<(), DastError> {
        std::fs::create_dir_all(&self.workspace)?;

        let mut port_bindings = HashMap::new();
        port_bindings.insert(
            ENGINE_CONTAINER_PORT.to_string(),
            Some(vec![PortBinding {
                host_ip: Some("127.0.0.1".to_string()),
                host_port: Some(self.host_port.to_string()),
            }]),
        );

        let host_config = HostConfig {
            port_bindings: Some(port_bindings),
            binds: Some(vec![format!("{}:{}:rw", self.workspace.display(), ENGINE_WORKDIR)]),
            ..Default::default()
        };

        let mut exposed_ports = HashMap::new();
        exposed_ports.insert(ENGINE_CONTAINER_PORT.to_string(), HashMap::new());

        let config = Config {
            image: Some(self.image.clone()),
            cmd: Some(Self::engine_command()),
            exposed_ports: Some(exposed_ports),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: self.container_name.clone(),
            platform: None,
        };

        self.docker.create_container(Some(options), config).await
            .map_err(|e| DastError::Container(format!("Failed to create container: {}", e)))?;

        self.docker
            .start_container(&self.container_name, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| DastError::Container(format!("Failed to start container: {}", e)))?;

        info!(container = %self.container_name, port = self.host_port, "Engine container created and started");
        Ok(())
    }

    /// Last lines of the engine's output, for diagnostics on teardown.
    async fn recent_logs(&self, lines: usize) -> Vec<String> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            tail: lines.to_string(),
            ..Default::default()
        };
        let mut stream = self.docker.logs(&self.container_name, Some(options));
        let mut out = Vec::new();
        while let Some(item) = stream.next().await {
            match item {
                Ok(line) => out.push(line.to_string().trim_end().to_string()),
                Err(_) => break,
            }
        }
        out
    }

    pub async fn stop_container(&self, remove: bool) -> Result<(), DastError> {
        let status = self.status().await;
        if status == ContainerStatus::NotFound {
            return Ok(());
        }

        if status == ContainerStatus::Running {
            self.docker
                .stop_container(&self.container_name, Some(StopContainerOptions { t: 10 }))
                .await
                .map_err(|e| DastError::Container(format!("Failed to stop container: {}", e)))?;
            info!(container = %self.container_name, "Container stopped");
        }

        if remove {
            self.docker
                .remove_container(
                    &self.container_name,
                    Some(RemoveContainerOptions { force: true, ..Default::default() }),
                )
                .await
                .map_err(|e| DastError::Container(format!("Failed to remove container: {}", e)))?;
            info!(container = %self.container_name, "Container removed");
        }

        Ok(())
    }
}

/// Remove a workspace no scan output was written to yet.
fn discard_workspace(workspace: &Path) {
    match std::fs::remove_dir_all(workspace) {
        Ok(()) => debug!(workspace = %workspace.display(), "Removed engine workspace"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(workspace = %workspace.display(), error = %e, "Failed to remove engine workspace"),
    }
}

#[async_trait]
impl EngineRuntime for DockerRuntime {
    fn name(&self) -> &str {
        "docker"
    }

    async fn start(&self) -> Result<EngineEndpoint, DastError> {
        self.ensure_image().await?;
        if self.status().await != ContainerStatus::NotFound {
            warn!(container = %self.container_name, "Removing leftover engine container");
            self.stop_container(true).await?;
        }
        if let Err(e) = self.create_and_start().await {
            // Do not leave a half-created container or its workspace behind.
            if let Err(cleanup) = self.stop_container(true).await {
                warn!(container = %self.container_name, error = %cleanup, "Failed to remove engine container after start failure");
            }
            discard_workspace(&self.workspace);
            return Err(e);
        }

        let api_url = Url::parse(&format!("http://127.0.0.1:{}/", self.host_port))
            .map_err(|e| DastError::Internal(format!("Engine URL: {}", e)))?;
        Ok(EngineEndpoint { api_url, workspace: Some(self.workspace.clone()) })
    }

    async fn stop(&self) -> Result<(), DastError> {
        if tracing::enabled!(tracing::Level::DEBUG) {
            for line in self.recent_logs(20).await {
                debug!(container = %self.container_name, "{}", line);
            }
        }
        self.stop_container(true).await
    }
}
