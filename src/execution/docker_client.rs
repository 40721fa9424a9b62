//! Docker operations behind the sandbox, on top of bollard.

use bollard::container::{
    Config, CreateContainerOptions, LogOutput, LogsOptions, RemoveContainerOptions,
    StartContainerOptions, UploadToContainerOptions, WaitContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::models::HostConfig;
use bollard::Docker;
use futures::StreamExt;

use crate::error::DockerError;
use crate::execution::resources::ExecutionLimits;

/// Working directory every sandbox container starts in.
pub const WORKSPACE_DIR: &str = "/workspace";

/// What a sandbox container looks like before it is created.
///
/// The interpreter never writes bytecode so uploads of a changed
/// `main.py` are always picked up.
#[derive(Debug, Clone)]
pub struct ContainerTemplate {
    pub name: String,
    pub image: String,
    /// Main process. `None` keeps the image entrypoint.
    pub cmd: Option<Vec<String>>,
    pub limits: ExecutionLimits,
    /// Unprivileged user; `None` keeps the image default.
    pub user: Option<String>,
    /// Docker network mode, `"none"` for an isolated sandbox.
    pub network_mode: String,
}

impl ContainerTemplate {
    fn isolated(&self) -> bool {
        self.network_mode == "none"
    }

    /// Host-side limits: memory with swap disabled, CPU quota, process cap
    /// and the network mode.
    fn host_config(&self) -> HostConfig {
        let memory = self.limits.memory_bytes();
        HostConfig {
            memory: Some(memory),
            memory_swap: Some(memory),
            cpu_period: Some(self.limits.cpu_period()),
            cpu_quota: Some(self.limits.cpu_quota()),
            pids_limit: Some(self.limits.max_processes as i64),
            network_mode: Some(self.network_mode.clone()),
            ..Default::default()
        }
    }

    fn create_body(&self) -> Config<String> {
        Config {
            image: Some(self.image.clone()),
            cmd: self.cmd.clone(),
            env: Some(vec!["PYTHONDONTWRITEBYTECODE=1".to_string()]),
            working_dir: Some(WORKSPACE_DIR.to_string()),
            user: self.user.clone(),
            network_disabled: Some(self.isolated()),
            host_config: Some(self.host_config()),
            tty: Some(false),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        }
    }
}

/// Result of executing a program in a sandbox container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecResult {
    /// Exit code of the program.
    pub exit_code: i64,
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
    /// Whether the host killed the program at the wall-clock limit.
    pub timed_out: bool,
}

impl ExecResult {
    /// Exit code reported when the wall-clock limit fires.
    pub const TIMEOUT_EXIT_CODE: i64 = 124;

    /// Exit code reported when the sandbox itself could not run the program.
    pub const INFRA_FAILURE_EXIT_CODE: i64 = -1;

    /// Creates a result for a program that ran to completion.
    pub fn completed(exit_code: i64, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
            timed_out: false,
        }
    }

    /// Creates the distinct outcome for a program killed at the time limit.
    pub fn timeout(seconds: u64, stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Self::TIMEOUT_EXIT_CODE,
            stdout: stdout.into(),
            stderr: format!("TimeoutError: execution exceeded {seconds}s wall-clock limit"),
            timed_out: true,
        }
    }

    /// Creates the sentinel outcome for an infrastructure failure.
    pub fn infra_failure(message: impl Into<String>) -> Self {
        Self {
            exit_code: Self::INFRA_FAILURE_EXIT_CODE,
            stdout: String::new(),
            stderr: message.into(),
            timed_out: false,
        }
    }

    /// Returns true if the program exited with status 0.
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }

    /// Returns true if this is the infrastructure sentinel.
    pub fn is_infra_failure(&self) -> bool {
        self.exit_code == Self::INFRA_FAILURE_EXIT_CODE && !self.timed_out
    }

    /// Returns the most useful diagnostic text: stderr if present, else stdout.
    pub fn diagnostic(&self) -> &str {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim()
        } else {
            stderr
        }
    }
}

/// Thin wrapper over the bollard client exposing what the sandbox needs.
pub struct DockerClient {
    docker: Docker,
}

fn run_failed(action: &str, err: bollard::errors::Error) -> DockerError {
    DockerError::RunFailed(format!("{action}: {err}"))
}

impl DockerClient {
    /// Connects to the local daemon (socket or `DOCKER_HOST`).
    pub fn new() -> Result<Self, DockerError> {
        Docker::connect_with_local_defaults()
            .map(|docker| Self { docker })
            .map_err(|e| DockerError::DaemonUnavailable(e.to_string()))
    }

    /// Creates a container from `template` and returns its id.
    pub async fn create_container(
        &self,
        template: &ContainerTemplate,
    ) -> Result<String, DockerError> {
        let options = CreateContainerOptions {
            name: template.name.clone(),
            platform: None,
        };
        self.docker
            .create_container(Some(options), template.create_body())
            .await
            .map(|response| response.id)
            .map_err(|e| run_failed("create container", e))
    }

    pub async fn start_container(&self, id: &str) -> Result<(), DockerError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| run_failed("start container", e))
    }

    /// Removes a container and its anonymous volumes. `force` kills it first
    /// if it is still running.
    pub async fn remove_container(&self, id: &str, force: bool) -> Result<(), DockerError> {
        let options = RemoveContainerOptions {
            force,
            v: true,
            ..Default::default()
        };
        self.docker
            .remove_container(id, Some(options))
            .await
            .map_err(|e| match e {
                bollard::errors::Error::DockerResponseServerError {
                    status_code: 404, ..
                } => DockerError::ContainerNotFound { id: id.to_string() },
                other => run_failed("remove container", other),
            })
    }

    /// Writes a single file into a container by streaming a one-entry tar
    /// archive extracted at the container root.
    ///
    /// `path` is relative to `/` (e.g. `workspace/main.py`); an existing
    /// file at that path is overwritten.
    pub async fn upload_file(
        &self,
        id: &str,
        path: &str,
        contents: &[u8],
    ) -> Result<(), DockerError> {
        let archive = build_single_file_archive(path, contents)?;
        let options = UploadToContainerOptions {
            path: "/".to_string(),
            ..Default::default()
        };
        self.docker
            .upload_to_container(id, Some(options), archive.into())
            .await
            .map_err(|e| DockerError::CopyFailed(format!("upload {path}: {e}")))
    }

    /// Runs `cmd` in a running container, optionally as `user`, and collects
    /// its exit code and both output streams.
    pub async fn exec_command(
        &self,
        id: &str,
        cmd: &[&str],
        user: Option<&str>,
    ) -> Result<ExecResult, DockerError> {
        let options = CreateExecOptions {
            cmd: Some(cmd.to_vec()),
            user,
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(false),
            ..Default::default()
        };
        let exec = self
            .docker
            .create_exec(id, options)
            .await
            .map_err(|e| run_failed("create exec", e))?;

        let (stdout, stderr) = match self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| run_failed("start exec", e))?
        {
            StartExecResults::Attached { output, .. } => collect_streams(output).await?,
            StartExecResults::Detached => (String::new(), String::new()),
        };

        let exit_code = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| run_failed("inspect exec", e))?
            .exit_code
            .unwrap_or(ExecResult::INFRA_FAILURE_EXIT_CODE);

        Ok(ExecResult::completed(exit_code, stdout, stderr))
    }

    /// Stdout and stderr of a container's main process, so far.
    pub async fn get_output(&self, id: &str) -> Result<(String, String), DockerError> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            ..Default::default()
        };
        collect_streams(self.docker.logs(id, Some(options))).await
    }

    /// Pulls `image` (with optional tag), draining the progress stream.
    pub async fn pull_image(&self, image: &str) -> Result<(), DockerError> {
        let options = CreateImageOptions {
            from_image: image,
            ..Default::default()
        };
        let mut progress = self.docker.create_image(Some(options), None, None);
        while let Some(step) = progress.next().await {
            step.map_err(|e| DockerError::PullFailed(format!("{image}: {e}")))?;
        }
        Ok(())
    }

    pub async fn image_exists(&self, image: &str) -> bool {
        self.docker.inspect_image(image).await.is_ok()
    }

    /// Blocks until the main process stops and returns its exit code.
    pub async fn wait_container(&self, id: &str) -> Result<i64, DockerError> {
        let options = WaitContainerOptions {
            condition: "not-running",
        };
        match self.docker.wait_container(id, Some(options)).next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // bollard reports a non-zero exit status as an error
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(run_failed("wait for container", e)),
            None => Err(DockerError::RunFailed(format!(
                "wait stream for container {id} ended without a status"
            ))),
        }
    }
}

/// Drains a multiplexed Docker output stream into separate stdout and
/// stderr strings.
async fn collect_streams<S>(mut stream: S) -> Result<(String, String), DockerError>
where
    S: futures::Stream<Item = Result<LogOutput, bollard::errors::Error>> + Unpin,
{
    let mut stdout = String::new();
    let mut stderr = String::new();

    while let Some(chunk) = stream.next().await {
        match chunk.map_err(|e| DockerError::RunFailed(format!("Error reading output: {e}")))? {
            LogOutput::StdOut { message } => stdout.push_str(&String::from_utf8_lossy(&message)),
            LogOutput::StdErr { message } => stderr.push_str(&String::from_utf8_lossy(&message)),
            _ => {}
        }
    }

    Ok((stdout, stderr))
}

/// Builds an in-memory tar archive holding one regular file.
fn build_single_file_archive(path: &str, contents: &[u8]) -> Result<Vec<u8>, DockerError> {
    let mut header = tar::Header::new_gnu();
    header.set_size(contents.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0);

    let mut builder = tar::Builder::new(Vec::new());
    builder.append_data(&mut header, path, contents)?;
    Ok(builder.into_inner()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(network_mode: &str) -> ContainerTemplate {
        ContainerTemplate {
            name: "sandbox-1".to_string(),
            image: "python:3.10-slim".to_string(),
            cmd: Some(vec!["sleep".to_string(), "infinity".to_string()]),
            limits: ExecutionLimits::new(512, 0.5, 32, 5),
            user: Some("nobody".to_string()),
            network_mode: network_mode.to_string(),
        }
    }

    #[test]
    fn test_create_body_applies_limits() {
        let body = template("none").create_body();
        let host = body.host_config.expect("host config");

        assert_eq!(host.memory, Some(512 * 1024 * 1024));
        assert_eq!(host.memory_swap, host.memory);
        assert_eq!(host.pids_limit, Some(32));
        assert_eq!(host.network_mode.as_deref(), Some("none"));
        assert_eq!(body.network_disabled, Some(true));
        assert_eq!(body.user.as_deref(), Some("nobody"));
        assert_eq!(body.working_dir.as_deref(), Some(WORKSPACE_DIR));
    }

    #[test]
    fn test_bridge_network_is_not_disabled() {
        let body = template("bridge").create_body();
        assert_eq!(body.network_disabled, Some(false));
    }

    #[test]
    fn test_exec_result_outcomes() {
        let ok = ExecResult::completed(0, "hi\n", "");
        assert!(ok.success());
        assert_eq!(ok.diagnostic(), "hi");

        let failed = ExecResult::completed(1, "partial", "AssertionError\n");
        assert!(!failed.success());
        assert_eq!(failed.diagnostic(), "AssertionError");

        let timeout = ExecResult::timeout(10, "");
        assert!(timeout.timed_out);
        assert!(!timeout.success());
        assert_ne!(timeout.exit_code, 0);
        assert_ne!(timeout.exit_code, 1);
        assert!(!timeout.is_infra_failure());

        let infra = ExecResult::infra_failure("sandbox not ready");
        assert!(infra.is_infra_failure());
        assert!(infra.stdout.is_empty());
        assert_eq!(infra.exit_code, -1);
    }

    #[test]
    fn test_single_file_archive() {
        let archive = build_single_file_archive("workspace/main.py", b"print(1)\n")
            .expect("archive should build");

        let mut reader = tar::Archive::new(archive.as_slice());
        let mut entries = reader.entries().expect("entries");
        let entry = entries.next().expect("one entry").expect("valid entry");
        assert_eq!(
            entry.path().expect("path").to_string_lossy(),
            "workspace/main.py"
        );
        assert_eq!(entry.header().size().expect("size"), 9);
        assert!(entries.next().is_none());
    }
}
