//! Firewall configuration
//!
//! Everything the firewall needs is fixed at construction time: the
//! workspace, the command allowlist, an optional domain allowlist and a
//! handful of resource limits. Every field has a default, so an empty TOML
//! file is a valid configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use bulwark_primitives::{CommandAllowlist, DEFAULT_COMMAND_ALLOWLIST};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest file `read_file` will return whole (1 MiB)
pub const MAX_READ_BYTES: u64 = 1_048_576;
/// Response bodies are cut at this many bytes (50 KiB)
pub const MAX_RESPONSE_BYTES: usize = 50 * 1024;
pub const COMMAND_TIMEOUT_SECS: u64 = 60;
pub const HTTP_TIMEOUT_SECS: u64 = 10;
pub const MAX_REDIRECTS: usize = 5;

pub const DEFAULT_WORKSPACE: &str = "ai_workspace";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Complete firewall configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FirewallConfig {
    /// Directory all file and command operations are confined to
    pub workspace_root: PathBuf,
    /// Base commands `execute_command` may run
    pub command_allowlist: CommandAllowlist,
    /// When set, `web_request` may only reach these hosts
    pub allowed_domains: Option<Vec<String>>,
    pub limits: Limits,
}

impl Default for FirewallConfig {
    fn default() -> Self {
        Self {
            workspace_root: PathBuf::from(DEFAULT_WORKSPACE),
            command_allowlist: CommandAllowlist::new(DEFAULT_COMMAND_ALLOWLIST),
            allowed_domains: None,
            limits: Limits::default(),
        }
    }
}

/// Resource limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub max_read_bytes: u64,
    pub max_response_bytes: usize,
    pub command_timeout_secs: u64,
    pub http_timeout_secs: u64,
    pub max_redirects: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_read_bytes: MAX_READ_BYTES,
            max_response_bytes: MAX_RESPONSE_BYTES,
            command_timeout_secs: COMMAND_TIMEOUT_SECS,
            http_timeout_secs: HTTP_TIMEOUT_SECS,
            max_redirects: MAX_REDIRECTS,
        }
    }
}

impl Limits {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

impl FirewallConfig {
    /// Defaults around a specific workspace
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            ..Self::default()
        }
    }

    pub fn with_allowlist(mut self, allowlist: CommandAllowlist) -> Self {
        self.command_allowlist = allowlist;
        self
    }

    pub fn with_allowed_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_domains = Some(domains.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }
}
