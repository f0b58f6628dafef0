//! The uniform outcome of every intent
//!
//! Three states, no more: the action happened, a policy refused it, or it
//! could not be evaluated at all. Serializes to a flat JSON object keyed by
//! `status` so an agent can read it without knowing Rust types.

use std::fmt;
use std::path::PathBuf;

use bulwark_primitives::SecurityViolation;
use serde::Serialize;
use serde_json::Value;

use crate::intent::Action;

/// Outcome tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Success,
    Blocked,
    Error,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Success => "success",
            Self::Blocked => "blocked",
            Self::Error => "error",
        })
    }
}

/// Result of validating (and possibly performing) one intent
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ValidationResult {
    /// The action was performed
    Success(ActionOutput),
    /// A security policy refused a structurally valid request
    Blocked(Refusal),
    /// The request could not be evaluated, or failed for operational reasons
    Error(Failure),
}

/// Payload of a successful action
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionOutput {
    WriteFile {
        path: PathBuf,
        bytes_written: usize,
    },
    ReadFile {
        path: PathBuf,
        content: String,
        size_bytes: u64,
    },
    ExecuteCommand {
        command: Vec<String>,
        returncode: i32,
        stdout: String,
        stderr: String,
        duration_seconds: f64,
    },
    WebRequest {
        url: String,
        method: String,
        status_code: u16,
        content: String,
        truncated: bool,
    },
    PagedRead {
        path: PathBuf,
        offset: u64,
        limit: u64,
        bytes_read: usize,
        content: String,
    },
    PatternSearch {
        path: PathBuf,
        pattern: String,
        case_sensitive: bool,
        matches: Vec<String>,
        /// Some line exceeded the per-line cap and was cut
        lines_truncated: bool,
    },
}

impl ActionOutput {
    pub fn action(&self) -> Action {
        match self {
            Self::WriteFile { .. } => Action::WriteFile,
            Self::ReadFile { .. } => Action::ReadFile,
            Self::ExecuteCommand { .. } => Action::ExecuteCommand,
            Self::WebRequest { .. } => Action::WebRequest,
            Self::PagedRead { .. } => Action::PagedRead,
            Self::PatternSearch { .. } => Action::PatternSearch,
        }
    }
}

/// Why a policy said no
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Refusal {
    pub action: Action,
    /// Guard that raised the refusal
    pub guard: String,
    pub reason: String,
    /// The exact value that tripped the guard
    pub violator: String,
}

/// Why a request could not be carried out
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    pub reason: String,
}

impl ValidationResult {
    /// Build a refusal from a primitive's violation. An empty violation value
    /// falls back to `requested`, so the caller always sees a violator.
    pub fn blocked(action: Action, violation: SecurityViolation, requested: &str) -> Self {
        let violator = if violation.value.is_empty() {
            requested.to_string()
        } else {
            violation.value
        };
        Self::Blocked(Refusal {
            action,
            guard: violation.guard.to_string(),
            reason: violation.message,
            violator,
        })
    }

    /// A refusal raised by the firewall's own policies rather than a primitive
    pub fn refused(
        action: Action,
        guard: &str,
        reason: impl Into<String>,
        violator: impl Into<String>,
    ) -> Self {
        Self::Blocked(Refusal {
            action,
            guard: guard.to_string(),
            reason: reason.into(),
            violator: violator.into(),
        })
    }

    pub fn error(action: impl Into<Option<Action>>, reason: impl Into<String>) -> Self {
        Self::Error(Failure {
            action: action.into(),
            reason: reason.into(),
        })
    }

    pub fn status(&self) -> Status {
        match self {
            Self::Success(_) => Status::Success,
            Self::Blocked(_) => Status::Blocked,
            Self::Error(_) => Status::Error,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    pub fn action(&self) -> Option<Action> {
        match self {
            Self::Success(output) => Some(output.action()),
            Self::Blocked(refusal) => Some(refusal.action),
            Self::Error(failure) => failure.action,
        }
    }

    /// Flat JSON rendering. Never fails: a serialization problem is itself
    /// reported as an `error` object.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|e| {
            serde_json::json!({
                "status": "error",
                "reason": format!("Failed to serialize result: {e}"),
            })
        })
    }
}
