//! Bulwark Primitives - low-level guards the firewall is built on
//!
//! This crate provides:
//! - Path confinement against a base directory
//! - Filename sanitizing and project-name grammar
//! - Command injection / allowlist checks
//! - A shell-free command runner with a wall-clock limit
//!
//! The firewall only talks to these through [`SecurityPrimitives`], so tests
//! can swap in a fake and the real implementation can change underneath.

pub mod allowlist;
pub mod command;
pub mod names;
pub mod path;
pub mod violation;

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

pub use allowlist::{CommandAllowlist, DEFAULT_COMMAND_ALLOWLIST};
pub use command::CommandOutput;
pub use violation::{CommandError, SecurityViolation};

/// Capability set the firewall needs from the primitives layer
#[async_trait]
pub trait SecurityPrimitives: Send + Sync {
    /// Make a single path component safe to create
    fn sanitize_filename(&self, name: &str) -> Result<String, SecurityViolation>;

    /// Resolve `path` under `base_dir`, refusing escapes
    fn guard_path_traversal(&self, path: &str, base_dir: &Path)
        -> Result<PathBuf, SecurityViolation>;

    /// Refuse metacharacters and non-allowlisted base commands
    fn guard_command_injection(
        &self,
        parts: &[String],
        allowed: &CommandAllowlist,
    ) -> Result<(), SecurityViolation>;

    /// Execute an argv without a shell
    async fn run_safe_command(
        &self,
        parts: &[String],
        cwd: &Path,
        allowed: &CommandAllowlist,
        timeout: Duration,
    ) -> Result<CommandOutput, CommandError>;

    /// Grammar and reserved-word check for a proposed identifier
    fn validate_project_name(&self, name: &str) -> Result<String, SecurityViolation>;
}

/// The shipped implementation backed by this crate's modules
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardPrimitives;

#[async_trait]
impl SecurityPrimitives for StandardPrimitives {
    fn sanitize_filename(&self, name: &str) -> Result<String, SecurityViolation> {
        names::sanitize_filename(name)
    }

    fn guard_path_traversal(
        &self,
        path: &str,
        base_dir: &Path,
    ) -> Result<PathBuf, SecurityViolation> {
        path::guard_path_traversal(path, base_dir)
    }

    fn guard_command_injection(
        &self,
        parts: &[String],
        allowed: &CommandAllowlist,
    ) -> Result<(), SecurityViolation> {
        command::guard_command_injection(parts, allowed)
    }

    async fn run_safe_command(
        &self,
        parts: &[String],
        cwd: &Path,
        allowed: &CommandAllowlist,
        timeout: Duration,
    ) -> Result<CommandOutput, CommandError> {
        command::run_safe_command(parts, cwd, allowed, timeout).await
    }

    fn validate_project_name(&self, name: &str) -> Result<String, SecurityViolation> {
        names::validate_project_name(name)
    }
}
