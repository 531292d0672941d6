//! Run one command in a sandbox and report its outcome.
//!
//! Spec construction and summary formatting are pure; the sandbox lifecycle
//! happens only in [`run`].

use anyhow::{Context, Result};
use benchbox::config::{Backend, Config};
use benchbox::customizer::ToolFlagCustomizer;
use benchbox::{
    open_sandbox, ExecutionResult, ExecutionSpec, Sandbox, SandboxError, SharedCustomizer,
    TimeoutError, ToolConfig,
};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Exit status reported when the command hit its timeout.
pub const TIMEOUT_EXIT_CODE: u8 = 124;

/// Arguments of `benchbox run`.
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Sandbox backend (overrides benchbox.toml)
    #[arg(short, long)]
    pub backend: Option<Backend>,

    /// Container image (container backend only)
    #[arg(long)]
    pub image: Option<String>,

    /// Working directory; never deleted. Defaults to an owned temp directory
    #[arg(short = 'C', long)]
    pub workdir: Option<PathBuf>,

    /// Timeout in milliseconds
    #[arg(short, long)]
    pub timeout_ms: Option<u64>,

    /// Environment entry KEY=VALUE (repeatable)
    #[arg(short, long = "env", value_parser = parse_env_pair)]
    pub envs: Vec<(String, String)>,

    /// Tool to expose through the TOOLS variable (repeatable)
    #[arg(long = "tool")]
    pub tools: Vec<String>,

    /// Append `FLAG=<tools>` when the command is EXE, given as EXE:FLAG
    #[arg(long, value_parser = parse_tool_flag)]
    pub tool_flag: Option<(String, String)>,

    /// Treat the command as one shell snippet
    #[arg(long)]
    pub shell: bool,

    /// Print the result as JSON instead of the raw log
    #[arg(long)]
    pub json: bool,

    /// Command to run
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

/// Parses `KEY=VALUE`.
pub fn parse_env_pair(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{s}'")),
    }
}

/// Parses `EXE:FLAG`.
pub fn parse_tool_flag(s: &str) -> Result<(String, String), String> {
    match s.split_once(':') {
        Some((exe, flag)) if !exe.is_empty() && !flag.is_empty() => {
            Ok((exe.to_string(), flag.to_string()))
        }
        _ => Err(format!("expected EXE:FLAG, got '{s}'")),
    }
}

/// Builds the spec from CLI arguments, falling back to config for tools.
pub fn build_spec(args: &RunArgs, config: &Config) -> Result<ExecutionSpec, SandboxError> {
    let builder = if args.shell {
        ExecutionSpec::builder().shell(args.command.join(" "))
    } else {
        ExecutionSpec::builder().command(args.command.iter().cloned())
    };

    let tools = if args.tools.is_empty() {
        &config.sandbox.tools
    } else {
        &args.tools
    };
    let tool_config = (!tools.is_empty()).then(|| ToolConfig::new(tools.iter().cloned()));

    builder
        .envs(args.envs.iter().cloned())
        .timeout(args.timeout_ms.map(Duration::from_millis))
        .tool_config(tool_config)
        .build()
}

/// Applies CLI overrides on top of the loaded config.
pub fn apply_overrides(args: &RunArgs, mut config: Config) -> Config {
    if let Some(backend) = args.backend {
        config.sandbox.backend = backend;
    }
    if let Some(image) = &args.image {
        config.sandbox.container.image.clone_from(image);
    }
    if let Some(dir) = &args.workdir {
        config.sandbox.local.working_dir = Some(dir.clone());
    }
    config
}

/// One-line outcome for stderr.
pub fn format_summary(result: &ExecutionResult) -> String {
    let millis = result.duration().as_millis();
    if result.success() {
        format!("{} exit 0 in {millis}ms", "✓".green())
    } else {
        format!(
            "{} exit {} in {millis}ms",
            "✗".red(),
            result.exit_code().to_string().red().bold()
        )
    }
}

/// How an execution ended once its sandbox was closed cleanly.
#[derive(Debug)]
pub enum Outcome {
    /// The command ran to completion, whatever its exit code.
    Completed(ExecutionResult),
    /// The command hit its timeout.
    TimedOut(TimeoutError),
}

/// Runs `spec`, then closes the sandbox on every path.
///
/// A failed close is an error even when the execution itself succeeded or
/// timed out. When both fail, the execution error is returned and the close
/// failure is named in its context.
pub async fn execute_then_close(sandbox: &dyn Sandbox, spec: &ExecutionSpec) -> Result<Outcome> {
    let outcome = sandbox.execute(spec).await;
    let closed = sandbox.close().await;

    match (outcome, closed) {
        (Ok(result), Ok(())) => Ok(Outcome::Completed(result)),
        (Err(SandboxError::Timeout(timeout)), Ok(())) => Ok(Outcome::TimedOut(timeout)),
        (Ok(_), Err(e)) => Err(e).context("Failed to close sandbox"),
        (Err(SandboxError::Timeout(timeout)), Err(e)) => Err(e).context(format!(
            "{} and closing the sandbox failed",
            timeout.detailed_message()
        )),
        (Err(e), Err(close_error)) => {
            warn!("Failed to close sandbox: {close_error}");
            Err(e).context(format!(
                "Failed to run {} (closing the sandbox also failed: {close_error})",
                spec.command_line()
            ))
        }
        (Err(e), Ok(())) => Err(e).context(format!("Failed to run {}", spec.command_line())),
    }
}

/// Entry point: opens a sandbox, runs the command, always closes the sandbox.
pub async fn run(args: RunArgs) -> Result<ExitCode> {
    let cwd = std::env::current_dir().context("Failed to get current directory")?;
    let config = apply_overrides(&args, Config::load(&cwd)?);
    let spec = build_spec(&args, &config)?;

    let mut customizers: Vec<SharedCustomizer> = Vec::new();
    if let Some((exe, flag)) = &args.tool_flag {
        customizers.push(Arc::new(ToolFlagCustomizer::new(exe, flag)));
    }

    let sandbox = open_sandbox(&config.sandbox, customizers)
        .await
        .context("Failed to open sandbox")?;

    let result = match execute_then_close(sandbox.as_ref(), &spec).await? {
        Outcome::Completed(result) => result,
        Outcome::TimedOut(timeout) => {
            eprintln!("{} {}", "⏱".yellow(), timeout.detailed_message().yellow());
            return Ok(ExitCode::from(TIMEOUT_EXIT_CODE));
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", result.merged_log());
    }
    eprintln!("{}", format_summary(&result));

    Ok(ExitCode::from(
        u8::try_from(result.exit_code()).unwrap_or(1),
    ))
}
