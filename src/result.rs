//! Outcome of a single sandbox execution.

use serde::Serialize;
use std::time::Duration;

/// Exit code, merged output and wall-clock duration of one `execute` call.
///
/// Built once when the execution finishes and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    exit_code: i32,
    merged_log: String,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    duration: Duration,
}

impl ExecutionResult {
    /// Creates a result.
    pub fn new(exit_code: i32, merged_log: impl Into<String>, duration: Duration) -> Self {
        Self {
            exit_code,
            merged_log: merged_log.into(),
            duration,
        }
    }

    /// The process exit code.
    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }

    /// Captured stdout and stderr, in the order the backend delivered them.
    pub fn merged_log(&self) -> &str {
        &self.merged_log
    }

    /// Time from dispatch to completion.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// True when the exit code is zero.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// True when the exit code is non-zero.
    pub fn failed(&self) -> bool {
        !self.success()
    }

    /// True when anything was captured.
    pub fn has_output(&self) -> bool {
        !self.merged_log.is_empty()
    }

    /// Length of the merged log in bytes.
    pub fn output_length(&self) -> usize {
        self.merged_log.len()
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)] // serde's serialize_with signature
fn serialize_millis<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}
