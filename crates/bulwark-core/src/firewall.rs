//! The intent router
//!
//! [`Firewall::validate`] is the one entry point an agent talks to. It turns
//! `(action, params)` into an [`Intent`], hands it to the matching guard and
//! returns that guard's result untouched. Each call runs inside its own
//! `intent` span with a fresh id, and its outcome is logged before returning.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bulwark_primitives::{
    CommandAllowlist, SecurityPrimitives, SecurityViolation, StandardPrimitives,
};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::command_guard::CommandGuard;
use crate::config::FirewallConfig;
use crate::file_guard::FileGuard;
use crate::intent::Intent;
use crate::network::{NetworkGuard, Resolver, SystemResolver};
use crate::result::ValidationResult;

/// Construction failures. Once built, a firewall never returns an `Err`.
#[derive(Debug, Error)]
pub enum FirewallError {
    #[error("Cannot prepare workspace {}: {source}", .path.display())]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub struct Firewall {
    config: FirewallConfig,
    primitives: Arc<dyn SecurityPrimitives>,
    files: FileGuard,
    commands: CommandGuard,
    network: NetworkGuard,
}

impl Firewall {
    /// Firewall over the real primitives and system DNS
    pub fn new(config: FirewallConfig) -> Result<Self, FirewallError> {
        Self::with_parts(config, Arc::new(StandardPrimitives), Arc::new(SystemResolver))
    }

    /// Firewall with explicit primitives and resolver.
    ///
    /// The workspace directory is created if missing and stored in canonical
    /// form; every guard is bound to that one path.
    pub fn with_parts(
        mut config: FirewallConfig,
        primitives: Arc<dyn SecurityPrimitives>,
        resolver: Arc<dyn Resolver>,
    ) -> Result<Self, FirewallError> {
        let requested = config.workspace_root.clone();
        let workspace_err = |source| FirewallError::Workspace {
            path: requested.clone(),
            source,
        };

        std::fs::create_dir_all(&requested).map_err(workspace_err)?;
        let root = requested.canonicalize().map_err(workspace_err)?;
        config.workspace_root = root.clone();

        let files = FileGuard::new(root.clone(), config.limits.max_read_bytes, primitives.clone());
        let commands = CommandGuard::new(
            root.clone(),
            config.command_allowlist.clone(),
            config.limits.command_timeout(),
            primitives.clone(),
        );
        let network = NetworkGuard::new(resolver, config.allowed_domains.clone(), &config.limits);

        info!(
            workspace = %root.display(),
            commands = %config.command_allowlist,
            domains = ?config.allowed_domains,
            "firewall ready"
        );

        Ok(Self {
            config,
            primitives,
            files,
            commands,
            network,
        })
    }

    /// Check and, if permitted, perform one action.
    ///
    /// Unknown actions and malformed params come back as `error`, never
    /// `blocked`.
    pub async fn validate(&self, action: &str, params: &Value) -> ValidationResult {
        match Intent::parse(action, params) {
            Ok(intent) => self.dispatch(intent).await,
            Err(e) => {
                warn!(action = %action, reason = %e, "malformed intent");
                ValidationResult::error(e.action(), e.to_string())
            }
        }
    }

    /// Run an already-typed intent through its guard
    pub async fn dispatch(&self, intent: Intent) -> ValidationResult {
        let action = intent.action();
        let span = info_span!("intent", id = %Uuid::new_v4(), action = %action);

        async move {
            let result = self.route(intent).await;
            audit(&result);
            result
        }
        .instrument(span)
        .await
    }

    async fn route(&self, intent: Intent) -> ValidationResult {
        match intent {
            Intent::WriteFile { path, content } => self.files.write(&path, &content),
            Intent::ReadFile { path } => self.files.read(&path),
            Intent::ExecuteCommand { command_parts } => self.commands.execute(&command_parts).await,
            Intent::WebRequest { url, method } => self.network.request(&url, &method).await,
            Intent::PagedRead {
                path,
                offset,
                limit,
            } => self.files.read_paged(&path, offset, limit),
            Intent::PatternSearch {
                path,
                pattern,
                case_sensitive,
            } => self.files.search(&path, &pattern, case_sensitive),
        }
    }

    /// Grammar and reserved-word check for a proposed project identifier
    pub fn validate_project_name(&self, name: &str) -> Result<String, SecurityViolation> {
        self.primitives.validate_project_name(name)
    }

    /// Canonical workspace root every guard is confined to
    pub fn workspace_root(&self) -> &Path {
        &self.config.workspace_root
    }

    pub fn command_allowlist(&self) -> &CommandAllowlist {
        self.commands.allowlist()
    }

    pub fn config(&self) -> &FirewallConfig {
        &self.config
    }

    pub fn network(&self) -> &NetworkGuard {
        &self.network
    }
}

impl fmt::Debug for Firewall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Firewall")
            .field("workspace_root", &self.config.workspace_root)
            .field("allowed_commands", &self.command_allowlist().len())
            .field("allowed_domains", &self.config.allowed_domains)
            .finish()
    }
}

fn audit(result: &ValidationResult) {
    match result {
        ValidationResult::Success(_) => info!(status = %result.status(), "intent allowed"),
        ValidationResult::Blocked(refusal) => warn!(
            status = %result.status(),
            guard = %refusal.guard,
            violator = %refusal.violator,
            reason = %refusal.reason,
            "intent blocked"
        ),
        ValidationResult::Error(failure) => {
            warn!(status = %result.status(), reason = %failure.reason, "intent failed")
        }
    }
}
