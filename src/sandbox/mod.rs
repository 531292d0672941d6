//! Sandboxes for isolated command execution.
//!
//! Two backends share one contract:
//! - [`LocalSandbox`]: local subprocesses rooted at an isolated directory
//! - [`ContainerSandbox`]: one long-lived Docker container, a fresh exec per call
//!
//! Every backend applies its customizer chain before translating the spec
//! into a backend-specific invocation, refuses to run once closed, and treats
//! a second `close` as a no-op.
//!
//! `execute` suspends the calling task until the command finishes, times out
//! or fails. A sandbox is single-writer: concurrent `execute` calls on one
//! instance share its directory or container, so callers that need isolation
//! use one sandbox per task. Closing while an execution is in flight is not
//! supported.

mod docker;
mod error;
mod local;
mod network;

pub use docker::{ContainerSandbox, ContainerSandboxBuilder};
pub use error::{SandboxError, TimeoutError};
pub use local::{LocalSandbox, LocalSandboxBuilder, DEFAULT_TEMP_PREFIX};
pub use network::NetworkPolicy;

pub(crate) use error::format_duration;

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::config::{Backend, SandboxConfig};
use crate::customizer::{DefaultTimeout, SharedCustomizer};
use crate::result::ExecutionResult;
use crate::spec::ExecutionSpec;

/// An isolated environment that runs [`ExecutionSpec`]s.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Runs `spec` after applying the customizer chain.
    ///
    /// Fails with [`SandboxError::Closed`] after [`close`](Self::close),
    /// with [`SandboxError::Timeout`] when the spec's timeout elapses, and with
    /// an I/O-class error when the backend itself fails. A non-zero exit code
    /// is a successful call returning a failed [`ExecutionResult`].
    async fn execute(&self, spec: &ExecutionSpec) -> Result<ExecutionResult, SandboxError>;

    /// Directory commands run in (inside the container for the container backend).
    fn working_directory(&self) -> &Path;

    /// Releases owned resources. Idempotent.
    async fn close(&self) -> Result<(), SandboxError>;

    /// True once [`close`](Self::close) has been called.
    fn is_closed(&self) -> bool;
}

/// Opens the backend selected by `config.backend`.
///
/// `customizers` run in order on every spec; a configured default timeout is
/// appended as the last step so it only fills in specs that have none.
pub async fn open_sandbox(
    config: &SandboxConfig,
    mut customizers: Vec<SharedCustomizer>,
) -> Result<Box<dyn Sandbox>, SandboxError> {
    if let Some(secs) = config.default_timeout_secs {
        customizers.push(std::sync::Arc::new(DefaultTimeout::new(
            Duration::from_secs(secs),
        )));
    }

    info!(backend = %config.backend, "Opening sandbox");
    match config.backend {
        Backend::Local => {
            let mut builder = LocalSandbox::builder()
                .temp_prefix(&config.local.temp_prefix)
                .customizers(customizers);
            if let Some(dir) = &config.local.working_dir {
                builder = builder.working_dir(dir);
            }
            Ok(Box::new(builder.build()?))
        }
        Backend::Container => {
            let sandbox = ContainerSandbox::builder(config.container.clone())
                .customizers(customizers)
                .start()
                .await?;
            Ok(Box::new(sandbox))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_open_local_backend_from_config() {
        let dir = tempdir().unwrap();
        let mut config = Config::default().sandbox;
        config.local.working_dir = Some(dir.path().to_path_buf());

        let sandbox = open_sandbox(&config, Vec::new()).await.unwrap();
        assert_eq!(sandbox.working_directory(), dir.path());
        assert!(!sandbox.is_closed());
        sandbox.close().await.unwrap();
        assert!(sandbox.is_closed());
        assert!(dir.path().exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_default_timeout_is_applied_from_config() {
        let mut config = Config::default().sandbox;
        config.default_timeout_secs = Some(1);

        let sandbox = open_sandbox(&config, Vec::new()).await.unwrap();
        let spec = ExecutionSpec::of(["sleep", "5"]).unwrap();
        let err = sandbox.execute(&spec).await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(
            err.as_timeout().unwrap().timeout(),
            Some(Duration::from_secs(1))
        );
        sandbox.close().await.unwrap();
    }

    #[test]
    fn test_sandbox_is_object_safe() {
        fn assert_send_sync<T: Send + Sync + ?Sized>() {}
        assert_send_sync::<dyn Sandbox>();
    }
}
