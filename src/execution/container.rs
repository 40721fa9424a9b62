//! Lifecycle of a single sandbox container.
//!
//! [`Container`] tracks where its Docker container is in the lifecycle so
//! callers cannot exec into a container that never started, and so that
//! removal happens at most once whichever path gets there first.
//!
//! ```text
//! Created -> Running -> Exited / Failed / TimedOut -> Removed
//! ```

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::DockerError;
use crate::execution::docker_client::{ContainerTemplate, DockerClient, ExecResult};

/// Lifecycle state of a managed container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerStatus {
    /// Created, not started; files may already be uploaded.
    Created,
    Running,
    /// Main process exited with this code.
    Exited(i64),
    /// Docker reported an error, or the session gave up on the container.
    Failed(String),
    /// Killed at the wall-clock limit.
    TimedOut,
    /// Removed from the daemon. Terminal.
    Removed,
}

impl std::fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContainerStatus::Created => write!(f, "created"),
            ContainerStatus::Running => write!(f, "running"),
            ContainerStatus::Exited(code) => write!(f, "exited({code})"),
            ContainerStatus::Failed(msg) => write!(f, "failed: {msg}"),
            ContainerStatus::TimedOut => write!(f, "timed out"),
            ContainerStatus::Removed => write!(f, "removed"),
        }
    }
}

/// A sandbox container and its lifecycle state.
#[derive(Debug)]
pub struct Container {
    id: String,
    status: ContainerStatus,
}

impl Container {
    /// Creates (but does not start) a container, pulling the image first if
    /// it is not present locally.
    pub async fn new(
        client: &DockerClient,
        template: &ContainerTemplate,
    ) -> Result<Self, DockerError> {
        if !client.image_exists(&template.image).await {
            info!(image = %template.image, "Pulling sandbox image");
            client.pull_image(&template.image).await?;
        }

        let id = client.create_container(template).await?;
        debug!(container_id = %id, name = %template.name, "Sandbox container created");

        Ok(Self {
            id,
            status: ContainerStatus::Created,
        })
    }

    pub async fn start(&mut self, client: &DockerClient) -> Result<(), DockerError> {
        if self.status != ContainerStatus::Created {
            return Err(DockerError::RunFailed(format!(
                "cannot start container {} in state {}",
                self.id, self.status
            )));
        }

        if let Err(e) = client.start_container(&self.id).await {
            self.status = ContainerStatus::Failed(format!("start failed: {e}"));
            return Err(e);
        }
        self.status = ContainerStatus::Running;
        Ok(())
    }

    /// Writes `contents` at `path` (relative to `/`), replacing any previous
    /// file. Allowed before start and while running.
    pub async fn upload(
        &self,
        client: &DockerClient,
        path: &str,
        contents: &[u8],
    ) -> Result<(), DockerError> {
        if !matches!(self.status, ContainerStatus::Created | ContainerStatus::Running) {
            return Err(DockerError::CopyFailed(format!(
                "cannot upload into container {} in state {}",
                self.id, self.status
            )));
        }
        client.upload_file(&self.id, path, contents).await
    }

    /// Runs `cmd` inside the running container.
    pub async fn exec(
        &self,
        client: &DockerClient,
        cmd: &[&str],
        user: Option<&str>,
    ) -> Result<ExecResult, DockerError> {
        if self.status != ContainerStatus::Running {
            return Err(DockerError::RunFailed(format!(
                "cannot exec in container {} in state {}",
                self.id, self.status
            )));
        }
        client.exec_command(&self.id, cmd, user).await
    }

    /// Waits for the main process to exit and returns its exit code.
    pub async fn wait(&mut self, client: &DockerClient) -> Result<i64, DockerError> {
        let exit_code = client.wait_container(&self.id).await?;
        self.status = ContainerStatus::Exited(exit_code);
        Ok(exit_code)
    }

    /// Stdout and stderr of the main process.
    pub async fn output(&self, client: &DockerClient) -> Result<(String, String), DockerError> {
        client.get_output(&self.id).await
    }

    pub fn mark_timed_out(&mut self) {
        if self.status != ContainerStatus::Removed {
            self.status = ContainerStatus::TimedOut;
        }
    }

    pub fn mark_failed(&mut self, message: impl Into<String>) {
        if self.status != ContainerStatus::Removed {
            self.status = ContainerStatus::Failed(message.into());
        }
    }

    /// Force-removes the container. A second call, or a container the daemon
    /// no longer knows, is a no-op.
    pub async fn cleanup(&mut self, client: &DockerClient) -> Result<(), DockerError> {
        if self.status == ContainerStatus::Removed {
            return Ok(());
        }
        match client.remove_container(&self.id, true).await {
            Ok(()) | Err(DockerError::ContainerNotFound { .. }) => {}
            Err(e) => return Err(e),
        }
        debug!(container_id = %self.id, previous = %self.status, "Sandbox container removed");
        self.status = ContainerStatus::Removed;
        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// A handle to a container that was never created through a client.
    #[cfg(test)]
    pub(crate) fn detached(id: &str, status: ContainerStatus) -> Self {
        Self {
            id: id.to_string(),
            status,
        }
    }
}
