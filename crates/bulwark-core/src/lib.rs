//! Bulwark Core - the action firewall between an agent and its side effects
//!
//! This crate provides:
//! - The intent router ([`Firewall::validate`])
//! - File, command and network guards
//! - The uniform three-way [`ValidationResult`]
//! - A tool adapter for OpenAI-style tool calls
//!
//! Every check is deterministic: the same intent against the same workspace
//! and configuration always gets the same answer.

pub mod adapter;
pub mod command_guard;
pub mod config;
pub mod file_guard;
pub mod firewall;
pub mod intent;
pub mod network;
pub mod result;

pub use adapter::{tool_schemas, ToolExecutor, TOOL_ACTIONS};
pub use config::{ConfigError, FirewallConfig, Limits};
pub use firewall::{Firewall, FirewallError};
pub use intent::{Action, Intent, IntentError};
pub use network::{NetworkGuard, Resolver, StaticResolver, SystemResolver, ValidatedUrl};
pub use result::{ActionOutput, Failure, Refusal, Status, ValidationResult};

pub use bulwark_primitives::{
    CommandAllowlist, SecurityPrimitives, SecurityViolation, StandardPrimitives,
    DEFAULT_COMMAND_ALLOWLIST,
};
