//! Sandboxed execution of candidate programs.
//!
//! A candidate and its test harness are combined into one Python program,
//! written into an isolated container and run with host-enforced limits
//! (no network, memory and CPU caps, wall-clock timeout).
//!
//! Two strategies are provided:
//!
//! - [`PersistentSandbox`] keeps one long-lived container per session and
//!   runs each program with `docker exec`. Calls are serialised through a
//!   session lock so uploads never race. A timed-out or failed session is
//!   torn down and recreated on the next call.
//! - [`EphemeralSandbox`] starts a fresh container per program, so calls
//!   are fully independent and may run in parallel.
//!
//! Neither strategy raises on candidate behaviour; infrastructure
//! failures become the `-1` sentinel in [`ExecResult`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::DockerError;
use crate::execution::container::Container;
use crate::execution::docker_client::{ContainerTemplate, DockerClient, ExecResult};
use crate::execution::resources::ExecutionLimits;

/// Path of the combined program inside the container, relative to `/`.
const PROGRAM_PATH: &str = "workspace/main.py";

/// Runs a candidate against its harness in isolation.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Executes `code` followed by `harness` and reports the outcome.
    ///
    /// Never fails: infrastructure problems are reported through
    /// [`ExecResult::infra_failure`].
    async fn execute(&self, code: &str, harness: &str) -> ExecResult;

    /// Releases any long-lived execution context. Idempotent.
    async fn shutdown(&self) {}
}

/// Builds the program actually run in the sandbox: the candidate's
/// definitions followed by the harness under a main guard.
///
/// The harness is indented by the caller; it is placed verbatim.
pub fn combine_program(code: &str, harness: &str) -> String {
    format!("{code}\n\nif __name__ == '__main__':\n{harness}\n")
}

/// How sandbox containers are allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxStrategy {
    /// One long-lived container per session.
    #[default]
    Persistent,
    /// A fresh container per execution.
    Ephemeral,
}

impl fmt::Display for SandboxStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SandboxStrategy::Persistent => write!(f, "persistent"),
            SandboxStrategy::Ephemeral => write!(f, "ephemeral"),
        }
    }
}

impl FromStr for SandboxStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "persistent" => Ok(SandboxStrategy::Persistent),
            "ephemeral" => Ok(SandboxStrategy::Ephemeral),
            other => Err(format!(
                "unknown sandbox strategy '{other}' (expected persistent or ephemeral)"
            )),
        }
    }
}

/// Configuration shared by both sandbox strategies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Docker image providing the Python interpreter.
    pub image: String,
    /// Host-enforced resource limits.
    pub limits: ExecutionLimits,
    /// Network mode ("none" disables networking).
    pub network_mode: String,
    /// Unprivileged user the program runs as.
    pub user: Option<String>,
    /// Container allocation strategy.
    pub strategy: SandboxStrategy,
}

impl SandboxConfig {
    /// Creates a sandbox configuration with defaults for the given image.
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            limits: ExecutionLimits::default(),
            network_mode: "none".to_string(),
            user: Some("nobody".to_string()),
            strategy: SandboxStrategy::default(),
        }
    }

    /// Sets the resource limits.
    pub fn with_limits(mut self, limits: ExecutionLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Sets the allocation strategy.
    pub fn with_strategy(mut self, strategy: SandboxStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Sets the user programs run as. `None` keeps the image default.
    pub fn with_user(mut self, user: Option<String>) -> Self {
        self.user = user;
        self
    }

    fn container_template(&self, name: String, cmd: Vec<String>) -> ContainerTemplate {
        ContainerTemplate {
            name,
            image: self.image.clone(),
            cmd: Some(cmd),
            limits: self.limits.clone(),
            user: self.user.clone(),
            network_mode: self.network_mode.clone(),
        }
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self::new("python:3.10-slim")
    }
}

/// Connects to the local Docker daemon and builds the configured sandbox.
pub fn connect_sandbox(config: SandboxConfig) -> Result<Arc<dyn Sandbox>, DockerError> {
    let client = Arc::new(DockerClient::new()?);
    Ok(match config.strategy {
        SandboxStrategy::Persistent => Arc::new(PersistentSandbox::new(client, config)),
        SandboxStrategy::Ephemeral => Arc::new(EphemeralSandbox::new(client, config)),
    })
}

enum SessionState {
    Uninitialized,
    Ready(Container),
    Broken(Container),
    Closed,
}

/// Sandbox backed by one long-lived container.
pub struct PersistentSandbox {
    client: Arc<DockerClient>,
    config: SandboxConfig,
    session: Mutex<SessionState>,
}

impl PersistentSandbox {
    /// Creates the sandbox. The container is created lazily on first use.
    pub fn new(client: Arc<DockerClient>, config: SandboxConfig) -> Self {
        Self {
            client,
            config,
            session: Mutex::new(SessionState::Uninitialized),
        }
    }

    /// Ensures the session holds a ready container, replacing a broken one.
    async fn ensure_ready(&self, session: &mut SessionState) -> Result<(), DockerError> {
        match std::mem::replace(session, SessionState::Uninitialized) {
            SessionState::Ready(container) => {
                *session = SessionState::Ready(container);
                return Ok(());
            }
            SessionState::Closed => {
                *session = SessionState::Closed;
                return Err(DockerError::RunFailed("sandbox has been shut down".to_string()));
            }
            SessionState::Broken(mut container) => {
                debug!(container_id = %container.id(), "Tearing down broken sandbox container");
                let removal = container.cleanup(&self.client).await;
                Self::retire_broken(session, container, removal)?;
            }
            SessionState::Uninitialized => {}
        }

        let name = format!("reason-forge-session-{}", Uuid::new_v4());
        let cmd = vec!["tail".to_string(), "-f".to_string(), "/dev/null".to_string()];
        let template = self.config.container_template(name, cmd);
        let mut container = Container::new(&self.client, &template).await?;

        if let Err(e) = container.start(&self.client).await {
            let removal = container.cleanup(&self.client).await;
            // A removal error is logged there; the start error is the one to report.
            let _ = Self::retire_broken(session, container, removal);
            return Err(e);
        }

        info!(
            container_id = %container.id(),
            image = %self.config.image,
            "Sandbox session container ready"
        );
        *session = SessionState::Ready(container);
        Ok(())
    }

    /// Settles the session after trying to remove a broken container. A
    /// container that could not be removed stays `Broken`, so the next call
    /// retries the teardown before creating a replacement.
    fn retire_broken(
        session: &mut SessionState,
        container: Container,
        removal: Result<(), DockerError>,
    ) -> Result<(), DockerError> {
        match removal {
            Ok(()) => {
                *session = SessionState::Uninitialized;
                Ok(())
            }
            Err(e) => {
                warn!(
                    container_id = %container.id(),
                    error = %e,
                    "Failed to remove broken sandbox container"
                );
                *session = SessionState::Broken(container);
                Err(e)
            }
        }
    }

    fn mark_broken(session: &mut SessionState, reason: &str) {
        if let SessionState::Ready(mut container) =
            std::mem::replace(session, SessionState::Uninitialized)
        {
            container.mark_failed(reason);
            *session = SessionState::Broken(container);
        }
    }
}

#[async_trait]
impl Sandbox for PersistentSandbox {
    async fn execute(&self, code: &str, harness: &str) -> ExecResult {
        let program = combine_program(code, harness);
        let timeout = self.config.limits.timeout();

        // Held for upload and execution so concurrent callers never race on
        // the shared program file.
        let mut session = self.session.lock().await;

        if let Err(e) = self.ensure_ready(&mut session).await {
            warn!(error = %e, "Sandbox container not ready");
            return ExecResult::infra_failure(format!("container not ready: {e}"));
        }

        let SessionState::Ready(container) = &*session else {
            return ExecResult::infra_failure("container not ready");
        };

        if let Err(e) = container
            .upload(&self.client, PROGRAM_PATH, program.as_bytes())
            .await
        {
            warn!(error = %e, "Failed to write program into sandbox");
            Self::mark_broken(&mut session, "upload failed");
            return ExecResult::infra_failure(format!("sandbox upload failed: {e}"));
        }

        let run = container.exec(
            &self.client,
            &["python", "/workspace/main.py"],
            self.config.user.as_deref(),
        );

        let outcome = tokio::time::timeout(timeout, run).await;
        match outcome {
            Ok(Ok(result)) => {
                debug!(exit_code = result.exit_code, "Sandbox execution finished");
                result
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Sandbox exec failed");
                Self::mark_broken(&mut session, "exec failed");
                ExecResult::infra_failure(format!("sandbox exec failed: {e}"))
            }
            Err(_) => {
                // The program may still be running in the container; recreate it.
                warn!(
                    timeout_secs = self.config.limits.timeout_seconds,
                    "Sandbox execution timed out"
                );
                Self::mark_broken(&mut session, "execution timed out");
                ExecResult::timeout(self.config.limits.timeout_seconds, "")
            }
        }
    }

    /// Removes the session container. Later calls report an infrastructure
    /// failure instead of recreating it.
    async fn shutdown(&self) {
        let mut session = self.session.lock().await;
        let state = std::mem::replace(&mut *session, SessionState::Closed);
        if let SessionState::Ready(mut container) | SessionState::Broken(mut container) = state {
            info!(container_id = %container.id(), "Removing sandbox container");
            if let Err(e) = container.cleanup(&self.client).await {
                warn!(error = %e, "Failed to remove sandbox container, forcing removal");
                force_remove_in_background(container.id().to_string());
            }
        }
    }
}

/// Runs `docker rm -f` on its own thread so callers on the async runtime
/// never block on the process.
fn force_remove_in_background(container_id: String) {
    std::thread::spawn(move || {
        let status = std::process::Command::new("docker")
            .args(["rm", "-f", &container_id])
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status();
        if let Err(e) = status {
            warn!(
                container_id = %container_id,
                error = %e,
                "Failed to force-remove sandbox container"
            );
        }
    });
}

impl Drop for PersistentSandbox {
    fn drop(&mut self) {
        let state = std::mem::replace(self.session.get_mut(), SessionState::Closed);
        if let SessionState::Ready(container) | SessionState::Broken(container) = state {
            warn!(
                container_id = %container.id(),
                "Sandbox dropped without shutdown, force-removing container"
            );
            force_remove_in_background(container.id().to_string());
        }
    }
}

/// Sandbox that runs every program in a fresh container.
pub struct EphemeralSandbox {
    client: Arc<DockerClient>,
    config: SandboxConfig,
}

impl EphemeralSandbox {
    pub fn new(client: Arc<DockerClient>, config: SandboxConfig) -> Self {
        Self { client, config }
    }

    async fn run(
        &self,
        container: &mut Container,
        program: &str,
    ) -> Result<ExecResult, DockerError> {
        container
            .upload(&self.client, PROGRAM_PATH, program.as_bytes())
            .await?;
        container.start(&self.client).await?;

        let timeout = self.config.limits.timeout();
        let outcome = tokio::time::timeout(timeout, container.wait(&self.client)).await;
        match outcome {
            Ok(exit_code) => {
                let exit_code = exit_code?;
                let (stdout, stderr) = container.output(&self.client).await?;
                Ok(ExecResult::completed(exit_code, stdout, stderr))
            }
            Err(_) => {
                container.mark_timed_out();
                warn!(
                    container_id = %container.id(),
                    timeout_secs = self.config.limits.timeout_seconds,
                    "Sandbox execution timed out"
                );
                let (stdout, _) = container.output(&self.client).await.unwrap_or_default();
                Ok(ExecResult::timeout(self.config.limits.timeout_seconds, stdout))
            }
        }
    }
}

#[async_trait]
impl Sandbox for EphemeralSandbox {
    async fn execute(&self, code: &str, harness: &str) -> ExecResult {
        let program = combine_program(code, harness);
        let name = format!("reason-forge-run-{}", Uuid::new_v4());
        let cmd = vec!["python".to_string(), "/workspace/main.py".to_string()];

        let template = self.config.container_template(name, cmd);
        let mut container = match Container::new(&self.client, &template).await {
            Ok(container) => container,
            Err(e) => {
                warn!(error = %e, "Failed to create sandbox container");
                return ExecResult::infra_failure(format!("container not ready: {e}"));
            }
        };

        let result = match self.run(&mut container, &program).await {
            Ok(result) => result,
            Err(e) => {
                warn!(container_id = %container.id(), error = %e, "Sandbox run failed");
                ExecResult::infra_failure(format!("sandbox run failed: {e}"))
            }
        };

        if let Err(e) = container.cleanup(&self.client).await {
            warn!(container_id = %container.id(), error = %e, "Failed to remove sandbox container");
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::container::ContainerStatus;

    #[test]
    fn test_combine_program() {
        let program = combine_program("def f(x):\n    return x", "    assert f(1) == 1");
        assert_eq!(
            program,
            "def f(x):\n    return x\n\nif __name__ == '__main__':\n    assert f(1) == 1\n"
        );
    }

    #[test]
    fn test_failed_teardown_keeps_container_for_retry() {
        let mut session = SessionState::Uninitialized;

        let broken = Container::detached("c0ffee", ContainerStatus::Failed("exec failed".into()));
        let err = PersistentSandbox::retire_broken(
            &mut session,
            broken,
            Err(DockerError::RunFailed("daemon busy".to_string())),
        )
        .unwrap_err();
        assert!(err.to_string().contains("daemon busy"));
        assert!(matches!(&session, SessionState::Broken(c) if c.id() == "c0ffee"));

        let SessionState::Broken(retry) = std::mem::replace(&mut session, SessionState::Closed)
        else {
            panic!("expected broken session");
        };
        PersistentSandbox::retire_broken(&mut session, retry, Ok(())).unwrap();
        assert!(matches!(session, SessionState::Uninitialized));
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!(
            "persistent".parse::<SandboxStrategy>(),
            Ok(SandboxStrategy::Persistent)
        );
        assert_eq!(
            " Ephemeral ".parse::<SandboxStrategy>(),
            Ok(SandboxStrategy::Ephemeral)
        );
        assert!("pooled".parse::<SandboxStrategy>().is_err());
        assert_eq!(SandboxStrategy::Ephemeral.to_string(), "ephemeral");
    }

    #[test]
    fn test_default_config_is_isolated() {
        let config = SandboxConfig::default();
        assert_eq!(config.image, "python:3.10-slim");
        assert_eq!(config.network_mode, "none");
        assert_eq!(config.user.as_deref(), Some("nobody"));
        assert_eq!(config.limits.timeout_seconds, 10);

        let container =
            config.container_template("c".to_string(), vec!["python".to_string()]);
        assert_eq!(container.network_mode, "none");
        assert_eq!(container.user.as_deref(), Some("nobody"));
        assert_eq!(container.limits.memory_mb, 256);
    }
}
