//! Command injection guard and shell-free runner
//!
//! String-level blocklists ("block rm -rf /") are trivially bypassed, so this
//! module does two independent things:
//!
//! 1. Refuses any argument carrying shell metacharacters, and any base command
//!    that is not on the allowlist.
//! 2. Runs the argv directly with no shell in between. Even if a token slipped
//!    past the check, there is no interpreter around to act on it.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::debug;

use crate::allowlist::CommandAllowlist;
use crate::violation::{
    CommandError, SecurityViolation, GUARD_COMMAND_ALLOWLIST, GUARD_COMMAND_INJECTION,
};

/// Characters that mean something to a shell
pub const SHELL_METACHARACTERS: &[char] = &[';', '|', '&', '`', '$', '>', '<', '\n', '\r', '\0'];

/// Captured result of a completed command
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandOutput {
    pub returncode: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

/// Validate an argv for injection markers and allowlist membership.
///
/// Metacharacters are checked on every element first, so the violator is
/// the first offending token. The base command is then matched exactly
/// against the allowlist.
pub fn guard_command_injection(
    parts: &[String],
    allowed: &CommandAllowlist,
) -> Result<(), SecurityViolation> {
    let Some(base) = parts.first() else {
        return Err(SecurityViolation::new(
            GUARD_COMMAND_INJECTION,
            "Empty command",
            "",
        ));
    };

    if base.trim().is_empty() {
        return Err(SecurityViolation::new(
            GUARD_COMMAND_INJECTION,
            "Empty command",
            base.as_str(),
        ));
    }

    for part in parts {
        if let Some(c) = part.chars().find(|c| SHELL_METACHARACTERS.contains(c)) {
            return Err(SecurityViolation::new(
                GUARD_COMMAND_INJECTION,
                format!("Command injection detected: dangerous character {c:?} in argument"),
                part.as_str(),
            ));
        }
    }

    if !allowed.contains(base) {
        return Err(SecurityViolation::new(
            GUARD_COMMAND_ALLOWLIST,
            format!("Command '{base}' is not in the allowlist. Allowed: {allowed}"),
            base.as_str(),
        ));
    }

    Ok(())
}

/// Run a guarded argv inside `cwd` with a wall-clock limit.
///
/// The child gets a null stdin and is killed if the timeout elapses.
pub async fn run_safe_command(
    parts: &[String],
    cwd: &Path,
    allowed: &CommandAllowlist,
    timeout: Duration,
) -> Result<CommandOutput, CommandError> {
    guard_command_injection(parts, allowed)?;

    let Some((program, args)) = parts.split_first() else {
        return Err(SecurityViolation::new(GUARD_COMMAND_INJECTION, "Empty command", "").into());
    };

    let mut command = tokio::process::Command::new(program);
    command
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .kill_on_drop(true);

    debug!(program = %program, args = args.len(), cwd = %cwd.display(), "spawning command");

    let started = Instant::now();
    let output = match tokio::time::timeout(timeout, command.output()).await {
        Ok(result) => result.map_err(|source| CommandError::Launch {
            program: program.clone(),
            source,
        })?,
        Err(_) => {
            return Err(CommandError::Timeout {
                program: program.clone(),
                timeout,
            })
        }
    };

    Ok(CommandOutput {
        returncode: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        duration: started.elapsed(),
    })
}
