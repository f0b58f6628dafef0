//! Allowlisted, shell-free command execution inside the workspace

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bulwark_primitives::{CommandAllowlist, CommandError, SecurityPrimitives};
use tracing::{info, warn};

use crate::intent::Action;
use crate::result::{ActionOutput, ValidationResult};

pub struct CommandGuard {
    root: PathBuf,
    allowlist: CommandAllowlist,
    timeout: Duration,
    primitives: Arc<dyn SecurityPrimitives>,
}

impl CommandGuard {
    pub fn new(
        root: PathBuf,
        allowlist: CommandAllowlist,
        timeout: Duration,
        primitives: Arc<dyn SecurityPrimitives>,
    ) -> Self {
        Self {
            root,
            allowlist,
            timeout,
            primitives,
        }
    }

    pub fn allowlist(&self) -> &CommandAllowlist {
        &self.allowlist
    }

    /// Check then run `parts` with the workspace as working directory.
    ///
    /// A non-zero exit status is still a success; only guard refusals,
    /// launch failures and timeouts change the status.
    pub async fn execute(&self, parts: &[String]) -> ValidationResult {
        let action = Action::ExecuteCommand;
        let requested = parts.first().map(String::as_str).unwrap_or_default();

        if let Err(violation) = self.primitives.guard_command_injection(parts, &self.allowlist) {
            return ValidationResult::blocked(action, violation, requested);
        }

        let output = match self
            .primitives
            .run_safe_command(parts, &self.root, &self.allowlist, self.timeout)
            .await
        {
            Ok(output) => output,
            Err(CommandError::Violation(violation)) => {
                return ValidationResult::blocked(action, violation, requested)
            }
            Err(e) => {
                warn!(command = %requested, error = %e, "command did not complete");
                return ValidationResult::error(action, e.to_string());
            }
        };

        info!(
            command = %requested,
            returncode = output.returncode,
            elapsed_ms = output.duration.as_millis() as u64,
            "command finished"
        );

        ValidationResult::Success(ActionOutput::ExecuteCommand {
            command: parts.to_vec(),
            returncode: output.returncode,
            stdout: output.stdout,
            stderr: output.stderr,
            duration_seconds: output.duration.as_secs_f64(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulwark_primitives::{StandardPrimitives, DEFAULT_COMMAND_ALLOWLIST};
    use pretty_assertions::assert_eq;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    fn guard(dir: &tempfile::TempDir, allowed: &[&str], timeout: Duration) -> CommandGuard {
        CommandGuard::new(
            dir.path().canonicalize().unwrap(),
            CommandAllowlist::new(allowed),
            timeout,
            Arc::new(StandardPrimitives),
        )
    }

    #[tokio::test]
    async fn test_runs_in_workspace() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "").unwrap();
        let guard = guard(&dir, DEFAULT_COMMAND_ALLOWLIST, Duration::from_secs(10));

        match guard.execute(&argv(&["ls"])).await {
            ValidationResult::Success(ActionOutput::ExecuteCommand {
                returncode, stdout, ..
            }) => {
                assert_eq!(returncode, 0);
                assert!(stdout.contains("marker.txt"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_success() {
        let dir = tempfile::tempdir().unwrap();
        let guard = guard(&dir, DEFAULT_COMMAND_ALLOWLIST, Duration::from_secs(10));

        match guard.execute(&argv(&["ls", "no-such-entry"])).await {
            ValidationResult::Success(ActionOutput::ExecuteCommand {
                returncode, stderr, ..
            }) => {
                assert_ne!(returncode, 0);
                assert!(!stderr.is_empty());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_injection_blocked_with_violator() {
        let dir = tempfile::tempdir().unwrap();
        let guard = guard(&dir, DEFAULT_COMMAND_ALLOWLIST, Duration::from_secs(10));

        let result = guard.execute(&argv(&["ls", "; rm -rf /"])).await;
        let ValidationResult::Blocked(refusal) = &result else {
            panic!("expected blocked, got {result:?}");
        };
        assert_eq!(refusal.guard, "command_injection");
        assert_eq!(refusal.violator, "; rm -rf /");
    }

    #[tokio::test]
    async fn test_not_allowlisted_blocked() {
        let dir = tempfile::tempdir().unwrap();
        let guard = guard(&dir, DEFAULT_COMMAND_ALLOWLIST, Duration::from_secs(10));

        let result = guard.execute(&argv(&["curl", "http://example.com"])).await;
        let ValidationResult::Blocked(refusal) = &result else {
            panic!("expected blocked, got {result:?}");
        };
        assert_eq!(refusal.guard, "command_allowlist");
        assert_eq!(refusal.violator, "curl");
    }

    #[tokio::test]
    async fn test_timeout_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let guard = guard(&dir, &["sleep"], Duration::from_millis(100));

        let result = guard.execute(&argv(&["sleep", "5"])).await;
        assert!(result.is_error(), "{result:?}");
        let ValidationResult::Error(failure) = result else {
            unreachable!()
        };
        assert!(failure.reason.contains("timed out"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let guard = guard(&dir, &["bulwark-no-such-binary"], Duration::from_secs(5));

        assert!(guard.execute(&argv(&["bulwark-no-such-binary"])).await.is_error());
    }
}
