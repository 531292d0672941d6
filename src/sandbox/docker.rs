//! Container sandbox backed by one long-lived Docker container.
//!
//! The container runs a placeholder process for its whole lifetime and every
//! `execute` call starts a fresh exec inside it. stdout and stderr arrive as
//! separate streams, so the merged log is stdout followed by stderr rather
//! than a true interleaving.

use async_trait::async_trait;
use bollard::container::{
    Config as ContainerConfig, CreateContainerOptions, LogOutput, RemoveContainerOptions,
    StopContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::service::HostConfig;
use bollard::Docker;
use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

use super::{format_duration, Sandbox, SandboxError, TimeoutError};
use crate::config::{ContainerSettings, PullPolicy};
use crate::customizer::{apply_all, SharedCustomizer};
use crate::result::ExecutionResult;
use crate::sandbox::NetworkPolicy;
use crate::spec::ExecutionSpec;

/// Keeps the container alive between execs.
const PLACEHOLDER_CMD: [&str; 3] = ["tail", "-f", "/dev/null"];

/// Runs the positional parameters as the command, without re-quoting them.
const EXEC_SCRIPT: &str = r#"exec "$@""#;

/// Tries the kill exec makes while waiting for a just-started command to
/// record its pid, 100ms apart.
const PID_FILE_POLLS: u32 = 30;

/// Seconds Docker waits before killing the placeholder on stop.
const STOP_GRACE_SECS: i64 = 2;

/// Runs commands inside a single long-lived container.
pub struct ContainerSandbox {
    docker: Docker,
    container_name: String,
    working_dir: PathBuf,
    shell: String,
    customizers: Vec<SharedCustomizer>,
    closed: AtomicBool,
}

/// Configures and starts a [`ContainerSandbox`].
pub struct ContainerSandboxBuilder {
    settings: ContainerSettings,
    customizers: Vec<SharedCustomizer>,
}

impl ContainerSandboxBuilder {
    /// Appends one customizer to the chain.
    #[must_use]
    pub fn customizer(mut self, customizer: SharedCustomizer) -> Self {
        self.customizers.push(customizer);
        self
    }

    /// Appends several customizers, preserving their order.
    #[must_use]
    pub fn customizers(mut self, customizers: impl IntoIterator<Item = SharedCustomizer>) -> Self {
        self.customizers.extend(customizers);
        self
    }

    /// Connects to Docker, pulls the image if the policy asks for it and
    /// starts the container.
    pub async fn start(self) -> Result<ContainerSandbox, SandboxError> {
        let settings = self.settings;

        let docker = Docker::connect_with_local_defaults().map_err(|e| {
            SandboxError::docker_unavailable(format!("Failed to connect to Docker: {e}"))
        })?;
        docker.ping().await.map_err(|e| {
            SandboxError::docker_unavailable(format!("Cannot ping Docker daemon: {e}"))
        })?;

        ensure_image(&docker, &settings.image, settings.pull).await?;

        let id = uuid::Uuid::new_v4().simple().to_string();
        let container_name = format!("benchbox-{}", &id[..12]);
        let config = build_container_config(&settings)?;

        debug!("Creating container: {}", container_name);
        docker
            .create_container(
                Some(CreateContainerOptions {
                    name: container_name.clone(),
                    platform: None,
                }),
                config,
            )
            .await
            .map_err(|e| match e {
                DockerError::DockerResponseServerError {
                    status_code: 404, ..
                } => SandboxError::image_not_found(&settings.image),
                e => SandboxError::container_failed_with("Failed to create container", e),
            })?;

        debug!("Starting container");
        if let Err(e) = docker.start_container::<String>(&container_name, None).await {
            force_remove(&docker, &container_name).await;
            return Err(SandboxError::container_failed_with(
                "Failed to start container",
                e,
            ));
        }

        info!(
            container = %container_name,
            image = %settings.image,
            "Container sandbox started"
        );

        Ok(ContainerSandbox {
            docker,
            container_name,
            working_dir: PathBuf::from(settings.working_dir),
            shell: settings.shell,
            customizers: self.customizers,
            closed: AtomicBool::new(false),
        })
    }
}

impl ContainerSandbox {
    /// Starts a builder for a container described by `settings`.
    pub fn builder(settings: ContainerSettings) -> ContainerSandboxBuilder {
        ContainerSandboxBuilder {
            settings,
            customizers: Vec::new(),
        }
    }

    /// Name of the backing container.
    pub fn container_name(&self) -> &str {
        &self.container_name
    }

    /// Runs `argv` inside the container and collects stdout, stderr and the exit code.
    async fn run_exec(
        &self,
        argv: Vec<String>,
        env: Vec<String>,
    ) -> Result<(Vec<u8>, Vec<u8>, i32), SandboxError> {
        let exec = self
            .docker
            .create_exec(
                &self.container_name,
                CreateExecOptions {
                    cmd: Some(argv),
                    env: Some(env),
                    working_dir: Some(self.working_dir.to_string_lossy().into_owned()),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| SandboxError::container_failed_with("Failed to create exec", e))?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        if let StartExecResults::Attached {
            output: mut stream, ..
        } = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| SandboxError::container_failed_with("Failed to start exec", e))?
        {
            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(LogOutput::StdOut { message }) => stdout.extend_from_slice(&message),
                    Ok(LogOutput::StdErr { message }) => stderr.extend_from_slice(&message),
                    Ok(_) => {}
                    Err(e) => {
                        return Err(SandboxError::container_failed_with(
                            "Failed to read exec output",
                            e,
                        ))
                    }
                }
            }
        }

        let inspect = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| SandboxError::container_failed_with("Failed to inspect exec", e))?;
        let exit_code = inspect
            .exit_code
            .and_then(|code| i32::try_from(code).ok())
            .unwrap_or(-1);

        Ok((stdout, stderr, exit_code))
    }

    /// Kills the process tree recorded in `pid_file` inside the container.
    async fn kill_recorded(&self, pid_file: &str) -> Result<(), SandboxError> {
        let argv = vec![self.shell.clone(), "-c".to_string(), kill_script(pid_file)];
        match self.run_exec(argv, Vec::new()).await? {
            (_, _, 0) => {
                debug!("Killed timed-out exec");
                Ok(())
            }
            (_, stderr, code) => Err(SandboxError::container_failed(format!(
                "Failed to kill timed-out exec (exit {code}): {}",
                String::from_utf8_lossy(&stderr).trim()
            ))),
        }
    }
}

#[async_trait]
impl Sandbox for ContainerSandbox {
    async fn execute(&self, spec: &ExecutionSpec) -> Result<ExecutionResult, SandboxError> {
        if self.is_closed() {
            return Err(SandboxError::Closed);
        }

        let spec = apply_all(&self.customizers, spec.clone())?;
        if spec.command().is_empty() {
            return Err(SandboxError::invalid_spec("command must not be empty"));
        }

        // With a timeout, the wrapper records its pid so the process tree can
        // be killed from a second exec.
        let pid_file = spec
            .timeout()
            .map(|_| format!("/tmp/.benchbox-exec-{}.pid", uuid::Uuid::new_v4().simple()));
        let argv = wrap_command(&self.shell, pid_file.as_deref(), spec.command());
        let env = spec
            .effective_env()
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();

        debug!(
            container = %self.container_name,
            command = %spec.command_line(),
            "Executing in container"
        );

        let started = Instant::now();
        let outcome = match spec.timeout() {
            Some(timeout) => match tokio::time::timeout(timeout, self.run_exec(argv, env)).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    let elapsed = started.elapsed();
                    let mut error = TimeoutError::exceeded(timeout).with_elapsed(elapsed);
                    if let Some(pid_file) = &pid_file {
                        if let Err(e) = self.kill_recorded(pid_file).await {
                            warn!(
                                container = %self.container_name,
                                "Timed-out command may still be running: {e}"
                            );
                            error = error.with_source(e);
                        }
                    }
                    warn!(
                        container = %self.container_name,
                        timeout = %format_duration(timeout),
                        "Container execution timed out"
                    );
                    return Err(error.into());
                }
            },
            None => self.run_exec(argv, env).await,
        };
        let (stdout, stderr, exit_code) = outcome?;
        let duration = started.elapsed();

        let mut merged_log = String::from_utf8_lossy(&stdout).into_owned();
        merged_log.push_str(&String::from_utf8_lossy(&stderr));

        info!(
            container = %self.container_name,
            exit_code,
            duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            output_bytes = merged_log.len(),
            "Container execution completed"
        );

        Ok(ExecutionResult::new(exit_code, merged_log, duration))
    }

    fn working_directory(&self) -> &Path {
        &self.working_dir
    }

    async fn close(&self) -> Result<(), SandboxError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        debug!("Stopping container {}", self.container_name);
        let stopped = self
            .docker
            .stop_container(
                &self.container_name,
                Some(StopContainerOptions {
                    t: STOP_GRACE_SECS,
                }),
            )
            .await;

        let removed = self
            .docker
            .remove_container(
                &self.container_name,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await;

        match (stopped, removed) {
            // 304: already stopped
            (
                Ok(())
                | Err(DockerError::DockerResponseServerError {
                    status_code: 304, ..
                }),
                Ok(()),
            ) => {
                info!(container = %self.container_name, "Container sandbox closed");
                Ok(())
            }
            (
                Ok(())
                | Err(DockerError::DockerResponseServerError {
                    status_code: 304, ..
                }),
                Err(e),
            ) => Err(SandboxError::container_failed_with(
                format!("Failed to remove container {}", self.container_name),
                e,
            )),
            (Err(e), _) => Err(SandboxError::container_failed_with(
                format!("Failed to stop container {}", self.container_name),
                e,
            )),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for ContainerSandbox {
    fn drop(&mut self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let name = self.container_name.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!("Container sandbox dropped without close, removing {}", name);
                let docker = self.docker.clone();
                handle.spawn(async move {
                    force_remove(&docker, &name).await;
                });
            }
            Err(_) => warn!(
                "Container {} leaked: sandbox dropped without close outside a runtime",
                name
            ),
        }
    }
}

/// `shell -c 'exec "$@"' shell cmd args...`
///
/// The shell's `$0` is the shell name itself so `"$@"` is exactly the
/// logical command. A bounded run keeps the shell as the parent instead of
/// exec'ing, so it can record its pid up front and remove the file once the
/// command exits.
fn wrap_command(shell: &str, pid_file: Option<&str>, command: &[String]) -> Vec<String> {
    let script = match pid_file {
        Some(pid_file) => format!(
            r#"echo $$ > {pid_file}; "$@"; status=$?; rm -f {pid_file}; exit $status"#
        ),
        None => EXEC_SCRIPT.to_string(),
    };
    let mut argv = Vec::with_capacity(command.len() + 4);
    argv.push(shell.to_string());
    argv.push("-c".to_string());
    argv.push(script);
    argv.push(shell.to_string());
    argv.extend(command.iter().cloned());
    argv
}

/// Waits for `pid_file`, then stops and kills the recorded process, its
/// process group and every descendant found through `/proc`. Children are
/// read from `task/*/children` where the kernel provides it, otherwise from
/// the parent pid in each `/proc/<pid>/stat`.
fn kill_script(pid_file: &str) -> String {
    format!(
        r#"i=0
while [ ! -s {pid_file} ] && [ $i -lt {PID_FILE_POLLS} ]; do sleep 0.1; i=$((i + 1)); done
if [ ! -s {pid_file} ]; then echo "no pid recorded in {pid_file}" >&2; exit 1; fi
pid=$(cat {pid_file})
children() {{
  if [ -r /proc/"$1"/task/"$1"/children ]; then
    cat /proc/"$1"/task/*/children 2>/dev/null
  else
    for stat in /proc/[0-9]*/stat; do
      read -r cpid _ _ ppid _ 2>/dev/null < "$stat" && [ "$ppid" = "$1" ] && echo "$cpid"
    done
  fi
}}
kill_tree() {{
  kill -STOP "$1" 2>/dev/null
  for child in $(children "$1"); do kill_tree "$child"; done
  kill -KILL "$1" 2>/dev/null
}}
kill_tree "$pid"
kill -KILL -- -"$pid" 2>/dev/null
rm -f {pid_file}
exit 0"#
    )
}

async fn ensure_image(docker: &Docker, image: &str, pull: PullPolicy) -> Result<(), SandboxError> {
    let should_pull = match pull {
        PullPolicy::Never => false,
        PullPolicy::Always => true,
        PullPolicy::IfMissing => docker.inspect_image(image).await.is_err(),
    };
    if !should_pull {
        return Ok(());
    }

    info!("Pulling image {}...", image);
    let mut stream = docker.create_image(
        Some(CreateImageOptions {
            from_image: image,
            ..Default::default()
        }),
        None,
        None,
    );

    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(info) => {
                if let Some(error) = info.error {
                    return Err(SandboxError::container_failed(format!(
                        "Docker pull error: {error}"
                    )));
                }
                if let Some(status) = info.status {
                    debug!("{}", status.trim());
                }
            }
            Err(DockerError::DockerResponseServerError {
                status_code: 404, ..
            }) => return Err(SandboxError::image_not_found(image)),
            Err(e) => {
                return Err(SandboxError::container_failed_with(
                    format!("Error pulling image {image}"),
                    e,
                ))
            }
        }
    }

    info!("Image pulled: {}", image);
    Ok(())
}

fn build_container_config(
    settings: &ContainerSettings,
) -> Result<ContainerConfig<String>, SandboxError> {
    let binds = settings
        .mounts
        .iter()
        .map(|mount| {
            let host_path = expand_path(&mount.host)?;
            let mode = if mount.readonly { "ro" } else { "rw" };
            Ok(format!("{}:{}:{}", host_path, mount.container, mode))
        })
        .collect::<Result<Vec<_>, SandboxError>>()?;

    let memory = settings
        .resources
        .memory
        .as_deref()
        .map(parse_memory_limit)
        .transpose()?;
    let nano_cpus = settings
        .resources
        .cpus
        .as_deref()
        .map(parse_cpus)
        .transpose()?;

    let network_mode = match settings.network {
        NetworkPolicy::Deny => Some("none".to_string()),
        NetworkPolicy::AllowAll => None,
    };

    Ok(ContainerConfig {
        image: Some(settings.image.clone()),
        working_dir: Some(settings.working_dir.clone()),
        cmd: Some(PLACEHOLDER_CMD.iter().map(ToString::to_string).collect()),
        labels: Some(
            [("benchbox.managed".to_string(), "true".to_string())]
                .into_iter()
                .collect(),
        ),
        host_config: Some(HostConfig {
            binds: (!binds.is_empty()).then_some(binds),
            memory,
            nano_cpus,
            network_mode,
            ..Default::default()
        }),
        ..Default::default()
    })
}

async fn force_remove(docker: &Docker, name: &str) {
    if let Err(e) = docker
        .remove_container(
            name,
            Some(RemoveContainerOptions {
                force: true,
                ..Default::default()
            }),
        )
        .await
    {
        warn!("Failed to remove container {}: {}", name, e);
    }
}

/// Expand ~ to home directory
fn expand_path(path: &str) -> Result<String, SandboxError> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| SandboxError::invalid_spec("Could not determine home directory"))?;
            Ok(home.join(rest).to_string_lossy().into_owned())
        }
        None => Ok(path.to_string()),
    }
}

/// Parse memory limit string (e.g., "8g", "512m") to bytes
fn parse_memory_limit(limit: &str) -> Result<i64, SandboxError> {
    let limit = limit.trim().to_lowercase();
    let invalid = || SandboxError::invalid_spec(format!("Invalid memory limit: {limit}"));

    let (digits, multiplier) = if let Some(num) = limit.strip_suffix('g') {
        (num, 1024 * 1024 * 1024)
    } else if let Some(num) = limit.strip_suffix('m') {
        (num, 1024 * 1024)
    } else if let Some(num) = limit.strip_suffix('k') {
        (num, 1024)
    } else {
        (limit.as_str(), 1)
    };

    digits
        .parse::<i64>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
        .ok_or_else(invalid)
}

/// Parse a CPU count (e.g., "2", "0.5") into Docker nano-CPUs
fn parse_cpus(cpus: &str) -> Result<i64, SandboxError> {
    let invalid = || SandboxError::invalid_spec(format!("Invalid cpu limit: {cpus}"));
    let value: f64 = cpus.trim().parse().map_err(|_| invalid())?;
    if !(value.is_finite() && value > 0.0) {
        return Err(invalid());
    }
    #[allow(clippy::cast_possible_truncation)]
    Ok((value * 1_000_000_000.0).round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Mount, ResourceSettings};
    use crate::spec::ToolConfig;
    use std::error::Error as _;
    use std::time::Duration;

    async fn docker_available() -> bool {
        let Ok(docker) = Docker::connect_with_local_defaults() else {
            return false;
        };
        tokio::time::timeout(Duration::from_secs(2), docker.ping())
            .await
            .is_ok_and(|r| r.is_ok())
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_wrap_command_passes_arguments_positionally() {
        let argv = wrap_command("/bin/sh", None, &strings(&["echo", "a b", "$HOME"]));
        assert_eq!(
            argv,
            ["/bin/sh", "-c", "exec \"$@\"", "/bin/sh", "echo", "a b", "$HOME"]
        );
    }

    #[test]
    fn test_wrap_command_records_pid_when_bounded() {
        let argv = wrap_command("/bin/sh", Some("/tmp/x.pid"), &strings(&["sleep", "9"]));
        assert!(argv[2].starts_with("echo $$ > /tmp/x.pid;"));
        assert_eq!(&argv[3..], ["/bin/sh", "sleep", "9"]);
    }

    #[test]
    fn test_bounded_wrapper_removes_pid_file_and_keeps_exit_status() {
        let argv = wrap_command("/bin/sh", Some("/tmp/x.pid"), &strings(&["false"]));
        let script = &argv[2];
        assert!(!script.contains("exec"));
        assert!(script.contains("rm -f /tmp/x.pid"));
        assert!(script.ends_with("exit $status"));
    }

    #[test]
    fn test_kill_script_waits_for_pid_and_kills_tree() {
        let script = kill_script("/tmp/x.pid");
        assert!(script.contains(&format!("$i -lt {PID_FILE_POLLS}")));
        assert!(script.contains("exit 1"));
        assert!(script.contains("/proc/\"$1\"/task/*/children"));
        assert!(script.contains("/proc/[0-9]*/stat"));
        assert!(script.contains("kill -KILL -- -\"$pid\""));
        assert!(script.contains("rm -f /tmp/x.pid"));
    }

    #[cfg(unix)]
    #[test]
    fn test_bounded_wrapper_runs_under_local_shell() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("run.pid");
        let pid_file = pid_file.to_str().unwrap();
        let argv = wrap_command("sh", Some(pid_file), &strings(&["sh", "-c", "exit 3"]));

        let status = std::process::Command::new(&argv[0])
            .args(&argv[1..])
            .status()
            .unwrap();
        assert_eq!(status.code(), Some(3));
        assert!(!std::path::Path::new(pid_file).exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_kill_script_kills_background_descendants() {
        use std::time::Instant;

        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("run.pid");
        let marker = dir.path().join("survived");
        let pid_file = pid_file.to_str().unwrap();
        let argv = wrap_command(
            "sh",
            Some(pid_file),
            &strings(&[
                "sh",
                "-c",
                &format!("(sleep 1; touch {}) & sleep 30", marker.display()),
            ]),
        );
        let mut child = std::process::Command::new(&argv[0])
            .args(&argv[1..])
            .spawn()
            .unwrap();

        let started = Instant::now();
        let status = std::process::Command::new("sh")
            .args(["-c", &kill_script(pid_file)])
            .status()
            .unwrap();
        assert!(status.success());
        child.wait().unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));

        std::thread::sleep(Duration::from_millis(1500));
        assert!(!marker.exists());
        assert!(!std::path::Path::new(pid_file).exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_kill_script_fails_without_pid_file() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("never.pid");
        let output = std::process::Command::new("sh")
            .args(["-c", &kill_script(pid_file.to_str().unwrap())])
            .output()
            .unwrap();
        assert_eq!(output.status.code(), Some(1));
        assert!(String::from_utf8_lossy(&output.stderr).contains("no pid recorded"));
    }

    #[test]
    fn test_shell_marker_is_not_expanded() {
        let argv = wrap_command(
            "/bin/sh",
            None,
            &strings(&[crate::spec::SHELL_MARKER, "echo hi"]),
        );
        assert_eq!(argv[4], crate::spec::SHELL_MARKER);
    }

    #[test]
    fn test_parse_memory_limit() {
        assert_eq!(parse_memory_limit("8g").unwrap(), 8 * 1024 * 1024 * 1024);
        assert_eq!(parse_memory_limit("512m").unwrap(), 512 * 1024 * 1024);
        assert_eq!(parse_memory_limit("1G").unwrap(), 1024 * 1024 * 1024);
        assert_eq!(parse_memory_limit("4096").unwrap(), 4096);
        assert!(parse_memory_limit("lots").is_err());
    }

    #[test]
    fn test_parse_cpus() {
        assert_eq!(parse_cpus("2").unwrap(), 2_000_000_000);
        assert_eq!(parse_cpus("0.5").unwrap(), 500_000_000);
        assert!(parse_cpus("0").is_err());
        assert!(parse_cpus("many").is_err());
    }

    #[test]
    fn test_expand_path() {
        assert_eq!(expand_path("/usr/bin").unwrap(), "/usr/bin");

        if dirs::home_dir().is_some() {
            let expanded = expand_path("~/.ssh").unwrap();
            assert!(!expanded.starts_with('~'));
            assert!(expanded.ends_with(".ssh"));
        }
    }

    #[test]
    fn test_build_container_config() {
        let settings = ContainerSettings {
            image: "ubuntu:22.04".to_string(),
            mounts: vec![Mount {
                host: "/data".to_string(),
                container: "/data".to_string(),
                readonly: true,
            }],
            network: NetworkPolicy::Deny,
            resources: ResourceSettings {
                memory: Some("1g".to_string()),
                cpus: Some("2".to_string()),
            },
            ..ContainerSettings::default()
        };

        let config = build_container_config(&settings).unwrap();
        assert_eq!(config.image.as_deref(), Some("ubuntu:22.04"));
        assert_eq!(config.working_dir.as_deref(), Some("/workspace"));
        assert_eq!(config.cmd.unwrap(), PLACEHOLDER_CMD);

        let host = config.host_config.unwrap();
        assert_eq!(host.binds.unwrap(), ["/data:/data:ro"]);
        assert_eq!(host.memory, Some(1024 * 1024 * 1024));
        assert_eq!(host.nano_cpus, Some(2_000_000_000));
        assert_eq!(host.network_mode.as_deref(), Some("none"));
    }

    #[test]
    fn test_default_container_config_has_no_limits() {
        let config = build_container_config(&ContainerSettings::default()).unwrap();
        let host = config.host_config.unwrap();
        assert!(host.binds.is_none());
        assert!(host.memory.is_none());
        assert!(host.network_mode.is_none());
    }

    #[tokio::test]
    async fn test_container_round_trip_when_docker_available() {
        if !docker_available().await {
            return;
        }
        let settings = ContainerSettings {
            image: "alpine:3.20".to_string(),
            ..ContainerSettings::default()
        };
        let sandbox = match ContainerSandbox::builder(settings).start().await {
            Ok(sandbox) => sandbox,
            // No registry access in this environment
            Err(e) if e.is_io() => return,
            Err(e) => panic!("unexpected error: {e}"),
        };

        let spec = ExecutionSpec::builder()
            .command(["sh", "-c", "echo out; echo err >&2; echo \"$TOOLS\"; exit 3"])
            .tool_config(ToolConfig::new(["brave", "filesystem"]))
            .build()
            .unwrap();
        let result = sandbox.execute(&spec).await.unwrap();
        assert_eq!(result.exit_code(), 3);
        assert_eq!(result.merged_log(), "out\nbrave,filesystem\nerr\n");

        let slow = ExecutionSpec::builder()
            .command(["sleep", "5"])
            .timeout(Duration::from_millis(300))
            .build()
            .unwrap();
        let err = sandbox.execute(&slow).await.unwrap_err();
        assert!(err.is_timeout());
        assert!(err.as_timeout().unwrap().source().is_none());

        let forking = ExecutionSpec::builder()
            .command(["sh", "-c", "(sleep 1; touch /tmp/survived) & sleep 30"])
            .timeout(Duration::from_millis(300))
            .build()
            .unwrap();
        assert!(sandbox.execute(&forking).await.unwrap_err().is_timeout());
        tokio::time::sleep(Duration::from_millis(1500)).await;

        // Unbounded, so this check does not record a pid file of its own.
        let clean = ExecutionSpec::of([
            "sh",
            "-c",
            "test ! -e /tmp/survived && ! ls /tmp/.benchbox-exec-*.pid 2>/dev/null",
        ])
        .unwrap();
        let check = sandbox.execute(&clean).await.unwrap();
        assert!(check.success(), "leftovers: {}", check.merged_log());

        sandbox.close().await.unwrap();
        sandbox.close().await.unwrap();
        assert!(sandbox.execute(&spec).await.unwrap_err().is_closed());
    }
}
