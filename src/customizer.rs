//! Last-mile transformations applied to a spec right before a backend runs it.
//!
//! Customizers operate on the logical command, environment and tool config
//! only. Backend details (shell expansion, container wrapping) happen after
//! the whole chain has run, so a customizer never sees escaping concerns.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::sandbox::SandboxError;
use crate::spec::ExecutionSpec;

/// A pure `ExecutionSpec -> ExecutionSpec` transformation.
///
/// Implementations must hold no mutable state: one instance may be shared by
/// many sandboxes and invoked from several tasks at once.
pub trait SpecCustomizer: Send + Sync {
    /// Returns the spec to execute instead of `spec`.
    fn customize(&self, spec: ExecutionSpec) -> Result<ExecutionSpec, SandboxError>;
}

/// Customizers as stored by sandboxes and chains.
pub type SharedCustomizer = Arc<dyn SpecCustomizer>;

impl<F> SpecCustomizer for F
where
    F: Fn(ExecutionSpec) -> Result<ExecutionSpec, SandboxError> + Send + Sync,
{
    fn customize(&self, spec: ExecutionSpec) -> Result<ExecutionSpec, SandboxError> {
        self(spec)
    }
}

/// Runs `customizers` in order over `spec`.
pub(crate) fn apply_all(
    customizers: &[SharedCustomizer],
    spec: ExecutionSpec,
) -> Result<ExecutionSpec, SandboxError> {
    customizers
        .iter()
        .try_fold(spec, |spec, customizer| customizer.customize(spec))
}

/// Returns its input untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl SpecCustomizer for Identity {
    fn customize(&self, spec: ExecutionSpec) -> Result<ExecutionSpec, SandboxError> {
        Ok(spec)
    }
}

/// The customizer that changes nothing. The returned spec is the input value itself.
pub fn identity() -> Identity {
    Identity
}

/// Applies a fixed sequence of customizers, feeding each output to the next.
#[derive(Clone, Default)]
pub struct Chain {
    steps: Vec<SharedCustomizer>,
}

impl Chain {
    /// Builds a chain from slots that may be empty, failing on the first missing one.
    ///
    /// Useful when customizers are resolved by name and a lookup can miss.
    pub fn from_slots<I>(slots: I) -> Result<Self, SandboxError>
    where
        I: IntoIterator<Item = Option<SharedCustomizer>>,
    {
        let steps = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.ok_or_else(|| {
                    SandboxError::invalid_spec(format!("customizer at index {index} is missing"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { steps })
    }

    /// Number of customizers in the chain.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// True when the chain has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl SpecCustomizer for Chain {
    fn customize(&self, spec: ExecutionSpec) -> Result<ExecutionSpec, SandboxError> {
        apply_all(&self.steps, spec)
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain").field("steps", &self.steps.len()).finish()
    }
}

/// Chains `customizers` in iteration order.
pub fn chain<I>(customizers: I) -> Chain
where
    I: IntoIterator<Item = SharedCustomizer>,
{
    Chain {
        steps: customizers.into_iter().collect(),
    }
}

/// Applies `inner` only when the predicate holds for the incoming spec.
pub struct When<P, C> {
    predicate: P,
    inner: C,
}

impl<P, C> SpecCustomizer for When<P, C>
where
    P: Fn(&ExecutionSpec) -> bool + Send + Sync,
    C: SpecCustomizer,
{
    fn customize(&self, spec: ExecutionSpec) -> Result<ExecutionSpec, SandboxError> {
        if (self.predicate)(&spec) {
            self.inner.customize(spec)
        } else {
            Ok(spec)
        }
    }
}

/// Conditional application. A panicking predicate is a bug and is not caught.
pub fn when<P, C>(predicate: P, inner: C) -> When<P, C>
where
    P: Fn(&ExecutionSpec) -> bool + Send + Sync,
    C: SpecCustomizer,
{
    When { predicate, inner }
}

/// Fills in a timeout for specs that do not set one.
#[derive(Debug, Clone, Copy)]
pub struct DefaultTimeout {
    timeout: Duration,
}

impl DefaultTimeout {
    /// Creates a customizer supplying `timeout` when a spec has none.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl SpecCustomizer for DefaultTimeout {
    fn customize(&self, spec: ExecutionSpec) -> Result<ExecutionSpec, SandboxError> {
        if spec.timeout().is_some() {
            return Ok(spec);
        }
        spec.to_builder().timeout(self.timeout).build()
    }
}

/// Appends `<flag>=<tool,tool,...>` to invocations of one specific CLI.
///
/// Fires only when `command[0]` equals the configured executable exactly and
/// the spec carries a tool config with at least one tool. A command that
/// already has the flag is rejected rather than getting it twice.
#[derive(Debug, Clone)]
pub struct ToolFlagCustomizer {
    executable: String,
    flag: String,
}

impl ToolFlagCustomizer {
    /// Creates a customizer for `executable` injecting `flag` (e.g. `--tools`).
    pub fn new(executable: impl Into<String>, flag: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            flag: flag.into(),
        }
    }

    fn has_flag(&self, command: &[String]) -> bool {
        command.iter().skip(1).any(|arg| {
            arg == &self.flag
                || arg
                    .strip_prefix(self.flag.as_str())
                    .is_some_and(|rest| rest.starts_with('='))
        })
    }
}

impl SpecCustomizer for ToolFlagCustomizer {
    fn customize(&self, spec: ExecutionSpec) -> Result<ExecutionSpec, SandboxError> {
        if spec.program() != self.executable {
            return Ok(spec);
        }
        let Some(tools) = spec.tool_config().and_then(|c| c.joined_tools()) else {
            return Ok(spec);
        };
        if self.has_flag(spec.command()) {
            return Err(SandboxError::illegal_state(format!(
                "command for '{}' already contains {}",
                self.executable, self.flag
            )));
        }
        spec.to_builder()
            .arg(format!("{}={tools}", self.flag))
            .build()
    }
}
