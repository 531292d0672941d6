//! Sandboxed command execution for agent benchmarks.
//!
//! Build an [`ExecutionSpec`], open a [`Sandbox`] (a [`LocalSandbox`] rooted at an
//! isolated directory, or a [`ContainerSandbox`] wrapping one long-lived container),
//! call [`Sandbox::execute`], then [`Sandbox::close`] it:
//!
//! ```no_run
//! use benchbox::{ExecutionSpec, LocalSandbox, Sandbox};
//!
//! # async fn demo() -> Result<(), benchbox::SandboxError> {
//! let sandbox = LocalSandbox::builder().build()?;
//! let spec = ExecutionSpec::of(["echo", "Hello, World!"])?;
//! let result = sandbox.execute(&spec).await;
//! sandbox.close().await?;
//! assert!(result?.success());
//! # Ok(())
//! # }
//! ```
//!
//! [`SpecCustomizer`]s registered on a sandbox rewrite each spec right before it
//! runs; see [`customizer`] for the composition helpers.

pub mod config;
pub mod customizer;
pub mod result;
pub mod sandbox;
pub mod spec;

pub use config::Config;
pub use customizer::{SharedCustomizer, SpecCustomizer};
pub use result::ExecutionResult;
pub use sandbox::{
    open_sandbox, ContainerSandbox, LocalSandbox, Sandbox, SandboxError, TimeoutError,
};
pub use spec::{ExecutionSpec, ExecutionSpecBuilder, ToolConfig, SHELL_MARKER, TOOLS_ENV_VAR};
