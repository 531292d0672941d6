//! `benchbox.toml` configuration.
//!
//! Every field has a default, and a missing file means all defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::sandbox::{NetworkPolicy, SandboxError, DEFAULT_TEMP_PREFIX};

/// Name of the configuration file looked up in the project directory.
pub const CONFIG_FILE: &str = "benchbox.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Sandbox settings.
    #[serde(default)]
    pub sandbox: SandboxConfig,
}

/// Which backend a sandbox runs on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Backend {
    /// Local subprocesses in an isolated directory
    #[default]
    Local,
    /// Execs inside one long-lived Docker container
    Container,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Container => write!(f, "container"),
        }
    }
}

impl std::str::FromStr for Backend {
    type Err = SandboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "container" | "docker" => Ok(Self::Container),
            _ => Err(SandboxError::invalid_spec(format!(
                "Unknown sandbox backend: '{s}'. Supported: local, container"
            ))),
        }
    }
}

/// Backend selection plus per-backend settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Backend to open
    #[serde(default)]
    pub backend: Backend,

    /// Timeout applied to specs that do not set their own
    #[serde(default)]
    pub default_timeout_secs: Option<u64>,

    /// Tools exposed to commands by default
    #[serde(default)]
    pub tools: Vec<String>,

    /// Local backend settings
    #[serde(default)]
    pub local: LocalSettings,

    /// Container backend settings
    #[serde(default)]
    pub container: ContainerSettings,
}

/// Local backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalSettings {
    /// Explicit working directory (never deleted by the sandbox)
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Name prefix for generated, sandbox-owned directories
    #[serde(default = "default_temp_prefix")]
    pub temp_prefix: String,
}

impl Default for LocalSettings {
    fn default() -> Self {
        Self {
            working_dir: None,
            temp_prefix: default_temp_prefix(),
        }
    }
}

/// When the container backend pulls its image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PullPolicy {
    /// Never pull; the image must already exist
    Never,
    /// Pull only when the image is not present locally
    #[default]
    IfMissing,
    /// Pull on every sandbox start
    Always,
}

/// Container backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerSettings {
    /// Base image
    #[serde(default = "default_image")]
    pub image: String,

    /// Working directory inside the container
    #[serde(default = "default_container_workdir")]
    pub working_dir: String,

    /// Shell used to wrap commands
    #[serde(default = "default_shell")]
    pub shell: String,

    /// Image pull policy
    #[serde(default)]
    pub pull: PullPolicy,

    /// Additional volume mounts
    #[serde(default)]
    pub mounts: Vec<Mount>,

    /// Network policy
    #[serde(default)]
    pub network: NetworkPolicy,

    /// Resource limits
    #[serde(default)]
    pub resources: ResourceSettings,
}

impl Default for ContainerSettings {
    fn default() -> Self {
        Self {
            image: default_image(),
            working_dir: default_container_workdir(),
            shell: default_shell(),
            pull: PullPolicy::default(),
            mounts: Vec::new(),
            network: NetworkPolicy::default(),
            resources: ResourceSettings::default(),
        }
    }
}

/// A host directory bound into the container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mount {
    /// Host path; a leading `~/` is expanded
    pub host: String,
    /// Path inside the container
    pub container: String,
    /// Mount read-only
    #[serde(default = "default_true")]
    pub readonly: bool,
}

/// Container resource limits. Unset means unlimited.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceSettings {
    /// Memory limit (e.g., "8g", "512m")
    #[serde(default)]
    pub memory: Option<String>,

    /// CPU limit (e.g., "2", "0.5")
    #[serde(default)]
    pub cpus: Option<String>,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_temp_prefix() -> String {
    DEFAULT_TEMP_PREFIX.to_string()
}

fn default_image() -> String {
    "ubuntu:22.04".to_string()
}

fn default_container_workdir() -> String {
    "/workspace".to_string()
}

fn default_shell() -> String {
    "/bin/sh".to_string()
}

impl Config {
    /// Load configuration from `benchbox.toml` in `project_dir`, using defaults if not found
    pub fn load(project_dir: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        let config_path = project_dir.join(CONFIG_FILE);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        Ok(config)
    }
}
