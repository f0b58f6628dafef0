//! Structured security violations
//!
//! Every primitive reports a refusal the same way: what went wrong, which
//! guard said no, and the exact value that tripped it. Callers turn these
//! into `blocked` results without having to parse messages.

use std::time::Duration;

use thiserror::Error;

pub const GUARD_PATH_TRAVERSAL: &str = "path_traversal";
pub const GUARD_COMMAND_INJECTION: &str = "command_injection";
pub const GUARD_COMMAND_ALLOWLIST: &str = "command_allowlist";
pub const GUARD_FILENAME: &str = "filename_sanitizer";
pub const GUARD_PROJECT_NAME: &str = "project_name";

/// A refusal raised by one of the guard primitives
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SecurityViolation {
    /// Name of the guard that raised the violation
    pub guard: &'static str,
    /// Human-readable explanation
    pub message: String,
    /// The offending value (path, token, command, ...)
    pub value: String,
}

impl SecurityViolation {
    pub fn new(guard: &'static str, message: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            guard,
            message: message.into(),
            value: value.into(),
        }
    }
}

/// Reasons a guarded command run can fail
#[derive(Debug, Error)]
pub enum CommandError {
    /// The command was refused before launch
    #[error(transparent)]
    Violation(#[from] SecurityViolation),

    #[error("Command '{program}' timed out after {}s", .timeout.as_secs())]
    Timeout { program: String, timeout: Duration },

    #[error("Failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
}
