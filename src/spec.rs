//! Immutable description of a command to run inside a sandbox.
//!
//! An [`ExecutionSpec`] is built once through [`ExecutionSpecBuilder`] and never
//! mutated afterwards. Anything that needs a different spec (customizers, the
//! CLI layering config defaults) derives a new one with
//! [`ExecutionSpec::to_builder`].

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::sandbox::SandboxError;

/// Environment variable carrying the comma-joined tool names.
pub const TOOLS_ENV_VAR: &str = "TOOLS";

/// First element of the two-element "opaque shell string" command form.
///
/// `[SHELL_MARKER, "echo $HOME | wc -c"]` is expanded into a platform shell
/// invocation by the local backend. The container backend runs it literally.
pub const SHELL_MARKER: &str = "__benchbox_shell__";

/// Tool-integration settings attached to a spec.
///
/// Its only runtime effect is the derived [`TOOLS_ENV_VAR`] variable (and
/// whatever flag a customizer chooses to add from the same names).
#[derive(Clone, Default, PartialEq, Eq, Hash, Deserialize)]
pub struct ToolConfig {
    /// Tool or server names, in the order they should be exposed.
    #[serde(default)]
    pub tools: Vec<String>,

    /// Secrets the tools need (API keys and the like).
    #[serde(default)]
    pub secrets: BTreeMap<String, String>,

    /// Fetch tool images lazily instead of up front.
    #[serde(default)]
    pub pull_on_demand: bool,
}

impl ToolConfig {
    /// Creates a config exposing the given tools.
    pub fn new<I, S>(tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tools: tools.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Adds a secret.
    #[must_use]
    pub fn with_secret(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.secrets.insert(key.into(), value.into());
        self
    }

    /// Sets the pull-on-demand flag.
    #[must_use]
    pub fn with_pull_on_demand(mut self, pull_on_demand: bool) -> Self {
        self.pull_on_demand = pull_on_demand;
        self
    }

    /// True when at least one tool is configured.
    pub fn has_tools(&self) -> bool {
        !self.tools.is_empty()
    }

    /// Comma-joined tool names, or `None` when there are none.
    pub fn joined_tools(&self) -> Option<String> {
        self.has_tools().then(|| self.tools.join(","))
    }
}

impl fmt::Debug for ToolConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redacted: BTreeMap<&str, &str> = self
            .secrets
            .keys()
            .map(|k| (k.as_str(), "<redacted>"))
            .collect();
        f.debug_struct("ToolConfig")
            .field("tools", &self.tools)
            .field("secrets", &redacted)
            .field("pull_on_demand", &self.pull_on_demand)
            .finish()
    }
}

/// An immutable command description: argv, environment overlay, timeout and tools.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExecutionSpec {
    command: Vec<String>,
    env: BTreeMap<String, String>,
    timeout: Option<Duration>,
    tool_config: Option<ToolConfig>,
}

impl ExecutionSpec {
    /// Starts an empty builder.
    pub fn builder() -> ExecutionSpecBuilder {
        ExecutionSpecBuilder::default()
    }

    /// Shorthand for a spec with only a command.
    pub fn of<I, S>(command: I) -> Result<Self, SandboxError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::builder().command(command).build()
    }

    /// A builder pre-filled with this spec's fields.
    pub fn to_builder(&self) -> ExecutionSpecBuilder {
        ExecutionSpecBuilder {
            command: self.command.clone(),
            env: self.env.clone(),
            timeout: self.timeout,
            tool_config: self.tool_config.clone(),
        }
    }

    /// The argument vector; `command()[0]` is the executable.
    pub fn command(&self) -> &[String] {
        &self.command
    }

    /// The executable (first element of the command).
    pub fn program(&self) -> &str {
        &self.command[0]
    }

    /// Explicit environment entries, overlaid on the inherited environment.
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Upper bound on execution time, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Tool-integration settings, if any.
    pub fn tool_config(&self) -> Option<&ToolConfig> {
        self.tool_config.as_ref()
    }

    /// The snippet of a `[SHELL_MARKER, snippet]` command, if this is one.
    pub fn shell_snippet(&self) -> Option<&str> {
        match self.command.as_slice() {
            [marker, snippet] if marker == SHELL_MARKER => Some(snippet.as_str()),
            _ => None,
        }
    }

    /// The environment the process should observe on top of what it inherits:
    /// the explicit entries plus [`TOOLS_ENV_VAR`] when tools are configured.
    pub fn effective_env(&self) -> BTreeMap<String, String> {
        let mut env = self.env.clone();
        if let Some(tools) = self.tool_config.as_ref().and_then(ToolConfig::joined_tools) {
            env.insert(TOOLS_ENV_VAR.to_string(), tools);
        }
        env
    }

    /// The command rendered as a single shell-quoted line, for logs and reports.
    pub fn command_line(&self) -> String {
        shell_words::join(&self.command)
    }
}

impl fmt::Display for ExecutionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

/// Accumulates the fields of an [`ExecutionSpec`].
#[derive(Debug, Clone, Default)]
pub struct ExecutionSpecBuilder {
    command: Vec<String>,
    env: BTreeMap<String, String>,
    timeout: Option<Duration>,
    tool_config: Option<ToolConfig>,
}

impl ExecutionSpecBuilder {
    /// Sets the whole command, replacing any previous one.
    #[must_use]
    pub fn command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = command.into_iter().map(Into::into).collect();
        self
    }

    /// Appends one argument to the command.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.command.push(arg.into());
        self
    }

    /// Sets the command to the shell-marker form wrapping `snippet`.
    #[must_use]
    pub fn shell(self, snippet: impl Into<String>) -> Self {
        self.command([SHELL_MARKER.to_string(), snippet.into()])
    }

    /// Adds one environment entry. Repeated calls accumulate.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Replaces every environment entry set so far with `envs`.
    ///
    /// Call this before [`env`](Self::env) when layering single keys on top.
    #[must_use]
    pub fn envs<I, K, V>(mut self, envs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env = envs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    /// Sets or clears the timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: impl Into<Option<Duration>>) -> Self {
        self.timeout = timeout.into();
        self
    }

    /// Sets or clears the tool config.
    #[must_use]
    pub fn tool_config(mut self, tool_config: impl Into<Option<ToolConfig>>) -> Self {
        self.tool_config = tool_config.into();
        self
    }

    /// Validates and freezes the spec.
    pub fn build(self) -> Result<ExecutionSpec, SandboxError> {
        if self.command.is_empty() {
            return Err(SandboxError::invalid_spec("command must not be empty"));
        }
        Ok(ExecutionSpec {
            command: self.command,
            env: self.env,
            timeout: self.timeout,
            tool_config: self.tool_config,
        })
    }
}
