//! Local subprocess sandbox rooted at an isolated working directory.
//!
//! Isolation is filesystem-only: commands inherit the host environment
//! (overlaid with the spec's entries) and network.

use async_trait::async_trait;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use super::{format_duration, Sandbox, SandboxError, TimeoutError};
use crate::customizer::{apply_all, SharedCustomizer};
use crate::result::ExecutionResult;
use crate::spec::ExecutionSpec;

/// Name prefix of working directories a sandbox creates (and later deletes) itself.
pub const DEFAULT_TEMP_PREFIX: &str = "benchbox-sandbox-";

/// Runs commands as local child processes inside one working directory.
pub struct LocalSandbox {
    working_dir: PathBuf,
    /// Prefix of the generated directory name, `None` when the caller supplied it.
    owned_prefix: Option<String>,
    customizers: Vec<SharedCustomizer>,
    closed: AtomicBool,
}

/// Configures a [`LocalSandbox`].
#[derive(Default)]
pub struct LocalSandboxBuilder {
    working_dir: Option<PathBuf>,
    temp_prefix: Option<String>,
    customizers: Vec<SharedCustomizer>,
}

impl LocalSandboxBuilder {
    /// Uses an existing (or to-be-created) directory the sandbox will never delete.
    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Prefix for the generated directory when no working dir is given.
    #[must_use]
    pub fn temp_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.temp_prefix = Some(prefix.into());
        self
    }

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

    /// Creates the working directory if needed and returns the sandbox.
    pub fn build(self) -> Result<LocalSandbox, SandboxError> {
        let (working_dir, owned_prefix) = match self.working_dir {
            Some(dir) => {
                std::fs::create_dir_all(&dir).map_err(|e| {
                    SandboxError::io(
                        format!("Failed to create working directory {}", dir.display()),
                        e,
                    )
                })?;
                (dir, None)
            }
            None => {
                let prefix = self
                    .temp_prefix
                    .unwrap_or_else(|| DEFAULT_TEMP_PREFIX.to_string());
                (create_owned_dir(&prefix)?, Some(prefix))
            }
        };

        info!(
            working_dir = %working_dir.display(),
            owned = owned_prefix.is_some(),
            "Local sandbox ready"
        );

        Ok(LocalSandbox {
            working_dir,
            owned_prefix,
            customizers: self.customizers,
            closed: AtomicBool::new(false),
        })
    }
}

impl LocalSandbox {
    /// Starts a builder.
    pub fn builder() -> LocalSandboxBuilder {
        LocalSandboxBuilder::default()
    }

    /// True when this sandbox generated its directory and will delete it on close.
    pub fn owns_working_dir(&self) -> bool {
        self.owned_prefix.as_deref().is_some_and(|prefix| {
            self.working_dir
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(prefix))
        })
    }

    fn release(&self) {
        if self.owns_working_dir() {
            debug!(working_dir = %self.working_dir.display(), "Removing owned working directory");
            remove_tree_best_effort(&self.working_dir);
        }
    }
}

#[async_trait]
impl Sandbox for LocalSandbox {
    async fn execute(&self, spec: &ExecutionSpec) -> Result<ExecutionResult, SandboxError> {
        if self.is_closed() {
            return Err(SandboxError::Closed);
        }

        let spec = apply_all(&self.customizers, spec.clone())?;
        let argv = platform_argv(&spec);
        debug!(command = %shell_words::join(&argv), "Executing locally");

        // stdout and stderr share one file description so writes interleave
        // in the order the child made them.
        let capture = tempfile::tempfile()
            .map_err(|e| SandboxError::io("Failed to create output capture file", e))?;
        let stdout = capture
            .try_clone()
            .map_err(|e| SandboxError::io("Failed to redirect stdout", e))?;
        let stderr = capture
            .try_clone()
            .map_err(|e| SandboxError::io("Failed to redirect stderr", e))?;

        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..])
            .current_dir(&self.working_dir)
            .envs(spec.effective_env())
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true);

        #[cfg(unix)]
        {
            cmd.process_group(0);
        }

        let started = Instant::now();
        let mut child = cmd
            .spawn()
            .map_err(|e| SandboxError::io(format!("Failed to launch '{}'", argv[0]), e))?;
        // Drop our handle to the write side held by `cmd`.
        drop(cmd);

        let status = match spec.timeout() {
            Some(timeout) => match tokio::time::timeout(timeout, child.wait()).await {
                Ok(status) => status,
                Err(_) => {
                    kill_process_tree(&mut child).await;
                    let elapsed = started.elapsed();
                    warn!(
                        timeout = %format_duration(timeout),
                        command = %spec.command_line(),
                        "Execution timed out, process tree killed"
                    );
                    return Err(TimeoutError::exceeded(timeout)
                        .with_elapsed(elapsed)
                        .into());
                }
            },
            None => child.wait().await,
        }
        .map_err(|e| SandboxError::io("Failed to wait for process", e))?;
        let duration = started.elapsed();

        let merged_log = read_capture(capture).await?;
        let exit_code = exit_code_of(status);

        info!(
            exit_code,
            duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            output_bytes = merged_log.len(),
            "Local execution completed"
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
        self.release();
        info!(working_dir = %self.working_dir.display(), "Local sandbox closed");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for LocalSandbox {
    fn drop(&mut self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("Local sandbox dropped without close, releasing");
            self.release();
        }
    }
}

/// Creates a fresh, private (0700 on Unix) directory under the system temp dir.
///
/// The prefix must be a plain name component so the generated directory is
/// still recognizable by it on close.
fn create_owned_dir(prefix: &str) -> Result<PathBuf, SandboxError> {
    if prefix.is_empty() || prefix.contains(['/', '\\']) {
        return Err(SandboxError::invalid_spec(format!(
            "temp prefix must be a non-empty file name without separators, got '{prefix}'"
        )));
    }

    tempfile::Builder::new()
        .prefix(prefix)
        .tempdir()
        .map(tempfile::TempDir::keep)
        .map_err(|e| SandboxError::io("Failed to create owned working directory", e))
}

/// Expands the shell-marker form into the platform shell; other commands pass through.
fn platform_argv(spec: &ExecutionSpec) -> Vec<String> {
    match spec.shell_snippet() {
        Some(snippet) if cfg!(windows) => {
            vec!["cmd".to_string(), "/C".to_string(), snippet.to_string()]
        }
        Some(snippet) => vec!["sh".to_string(), "-c".to_string(), snippet.to_string()],
        None => spec.command().to_vec(),
    }
}

/// Kills the child's whole process group, then the child itself.
async fn kill_process_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::errno::Errno;
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        // The child leads its own group, so its pid is the group id.
        if let Some(pgid) = child.id().and_then(|pid| i32::try_from(pid).ok()) {
            match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(e) => warn!(pgid, "Failed to kill process group: {e}"),
            }
        }
    }

    if let Err(e) = child.kill().await {
        debug!("Child already gone after group kill: {e}");
    }
}

async fn read_capture(mut capture: File) -> Result<String, SandboxError> {
    let bytes = tokio::task::spawn_blocking(move || -> std::io::Result<Vec<u8>> {
        let mut bytes = Vec::new();
        capture.seek(SeekFrom::Start(0))?;
        capture.read_to_end(&mut bytes)?;
        Ok(bytes)
    })
    .await
    .map_err(|e| SandboxError::io("Output capture task failed", e))?
    .map_err(|e| SandboxError::io("Failed to read captured output", e))?;

    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Exit code, or `128 + signal` for a signal-terminated process on Unix.
fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}

/// Deletes `root` recursively, logging and skipping entries that cannot be removed.
fn remove_tree_best_effort(root: &Path) {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %root.display(), "Failed to read directory during cleanup: {e}");
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        // symlink_metadata so a link to a directory is removed, not followed
        let is_dir = std::fs::symlink_metadata(&path).is_ok_and(|m| m.is_dir());
        if is_dir {
            remove_tree_best_effort(&path);
        } else if let Err(e) = std::fs::remove_file(&path) {
            warn!(path = %path.display(), "Failed to delete file during cleanup: {e}");
        }
    }

    if let Err(e) = std::fs::remove_dir(root) {
        warn!(path = %root.display(), "Failed to delete directory during cleanup: {e}");
    }
}
