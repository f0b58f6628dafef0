//! Actions and typed intents
//!
//! The agent sends an action name plus a loose JSON parameter object. That
//! object is checked once, here, and turned into an [`Intent`] carrying only
//! the fields its action needs. Guards never see raw JSON.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Default page size for `paged_read` when no limit is given
pub const DEFAULT_PAGE_LIMIT: i64 = 2000;

/// The fixed set of actions the firewall understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    WriteFile,
    ReadFile,
    ExecuteCommand,
    WebRequest,
    PagedRead,
    PatternSearch,
}

impl Action {
    pub const ALL: [Action; 6] = [
        Action::WriteFile,
        Action::ReadFile,
        Action::ExecuteCommand,
        Action::WebRequest,
        Action::PagedRead,
        Action::PatternSearch,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WriteFile => "write_file",
            Self::ReadFile => "read_file",
            Self::ExecuteCommand => "execute_command",
            Self::WebRequest => "web_request",
            Self::PagedRead => "paged_read",
            Self::PatternSearch => "pattern_search",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = IntentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| IntentError::UnknownAction {
                action: s.to_string(),
            })
    }
}

fn valid_actions() -> String {
    let mut names: Vec<&str> = Action::ALL.iter().map(Action::as_str).collect();
    names.sort_unstable();
    names.join(", ")
}

/// A malformed request: unknown action or wrongly shaped parameters
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntentError {
    #[error("Unknown action '{action}'. Valid actions: [{}]", valid_actions())]
    UnknownAction { action: String },

    #[error("Action '{action}' requires {requirement}.")]
    InvalidParams {
        action: Action,
        requirement: &'static str,
    },
}

impl IntentError {
    /// The action the error relates to, if it was recognized
    pub fn action(&self) -> Option<Action> {
        match self {
            Self::UnknownAction { .. } => None,
            Self::InvalidParams { action, .. } => Some(*action),
        }
    }
}

/// One request, with exactly the fields its action needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    WriteFile {
        path: String,
        content: String,
    },
    ReadFile {
        path: String,
    },
    ExecuteCommand {
        command_parts: Vec<String>,
    },
    WebRequest {
        url: String,
        method: String,
    },
    PagedRead {
        path: String,
        offset: i64,
        limit: i64,
    },
    PatternSearch {
        path: String,
        pattern: String,
        case_sensitive: bool,
    },
}

impl Intent {
    /// Check `params` against the shape `action` requires.
    ///
    /// `params` is normally a JSON object; anything else is treated as an
    /// object with no keys, so the caller gets a missing-parameter error.
    pub fn parse(action: &str, params: &Value) -> Result<Self, IntentError> {
        let action: Action = action.parse()?;
        let invalid = |requirement: &'static str| IntentError::InvalidParams {
            action,
            requirement,
        };

        match action {
            Action::WriteFile => {
                const NEEDS: &str = "string 'path' and 'content' parameters";
                let path = str_param(params, "path").ok_or_else(|| invalid(NEEDS))?;
                let content = match params.get("content") {
                    Some(Value::String(s)) => s.clone(),
                    None | Some(Value::Null) => return Err(invalid(NEEDS)),
                    Some(other) => other.to_string(),
                };
                Ok(Self::WriteFile { path, content })
            }

            Action::ReadFile => {
                let path =
                    str_param(params, "path").ok_or_else(|| invalid("a string 'path' parameter"))?;
                Ok(Self::ReadFile { path })
            }

            Action::ExecuteCommand => {
                const NEEDS: &str = "a non-empty 'command_parts' list of strings";
                let parts = params
                    .get("command_parts")
                    .and_then(Value::as_array)
                    .filter(|parts| !parts.is_empty())
                    .ok_or_else(|| invalid(NEEDS))?;
                let command_parts = parts
                    .iter()
                    .map(|p| p.as_str().map(str::to_string))
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| invalid(NEEDS))?;
                Ok(Self::ExecuteCommand { command_parts })
            }

            Action::WebRequest => {
                const NEEDS: &str = "a non-empty 'url' string parameter";
                let url = str_param(params, "url")
                    .filter(|u| !u.is_empty())
                    .ok_or_else(|| invalid(NEEDS))?;
                let method = match params.get("method") {
                    None | Some(Value::Null) => "GET".to_string(),
                    Some(Value::String(m)) => m.clone(),
                    Some(_) => return Err(invalid("'method' to be a string when given")),
                };
                Ok(Self::WebRequest { url, method })
            }

            Action::PagedRead => {
                let path =
                    str_param(params, "path").ok_or_else(|| invalid("a string 'path' parameter"))?;
                let offset = int_param(params, "offset", 0)
                    .ok_or_else(|| invalid("'offset' to be an integer when given"))?;
                let limit = int_param(params, "limit", DEFAULT_PAGE_LIMIT)
                    .ok_or_else(|| invalid("'limit' to be an integer when given"))?;
                Ok(Self::PagedRead {
                    path,
                    offset,
                    limit,
                })
            }

            Action::PatternSearch => {
                const NEEDS: &str = "string 'path' and 'pattern' parameters";
                let path = str_param(params, "path").ok_or_else(|| invalid(NEEDS))?;
                let pattern = str_param(params, "pattern").ok_or_else(|| invalid(NEEDS))?;
                let case_sensitive = match params.get("case_sensitive") {
                    None | Some(Value::Null) => false,
                    Some(Value::Bool(b)) => *b,
                    Some(_) => {
                        return Err(invalid("'case_sensitive' to be a boolean when given"))
                    }
                };
                Ok(Self::PatternSearch {
                    path,
                    pattern,
                    case_sensitive,
                })
            }
        }
    }

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

fn str_param(params: &Value, name: &str) -> Option<String> {
    params.get(name).and_then(Value::as_str).map(str::to_string)
}

/// `None` only when the key is present with a non-integer value
fn int_param(params: &Value, name: &str, default: i64) -> Option<i64> {
    match params.get(name) {
        None | Some(Value::Null) => Some(default),
        Some(v) => v.as_i64(),
    }
}
