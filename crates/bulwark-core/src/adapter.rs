//! Tool adapter
//!
//! Bridges LLM tool calls to the firewall. Tool names are what the model
//! sees; each maps onto one firewall action and the arguments are passed
//! through unchanged. Nothing here can fail: every outcome, including an
//! unknown tool, comes back as JSON the model can read.

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::firewall::Firewall;
use crate::intent::Action;
use crate::result::ValidationResult;

/// Tool name as the model sees it, and the action it runs
pub const TOOL_ACTIONS: &[(&str, Action)] = &[
    ("write_file", Action::WriteFile),
    ("read_file", Action::ReadFile),
    ("run_command", Action::ExecuteCommand),
    ("web_request", Action::WebRequest),
    ("read_file_paged", Action::PagedRead),
    ("search_in_file", Action::PatternSearch),
];

fn available_tools() -> String {
    let mut names: Vec<&str> = TOOL_ACTIONS.iter().map(|(name, _)| *name).collect();
    names.sort_unstable();
    names.join(", ")
}

/// OpenAI-compatible function schemas for every tool
pub fn tool_schemas() -> Vec<Value> {
    json!([
        {
            "type": "function",
            "function": {
                "name": "write_file",
                "description": "Create or overwrite a text file inside the workspace. Parent directories are created automatically. Paths that leave the workspace are blocked.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "path": { "type": "string", "description": "Path relative to the workspace root, e.g. 'src/main.py'" },
                        "content": { "type": "string", "description": "Full text content of the file" }
                    },
                    "required": ["path", "content"],
                    "additionalProperties": false
                }
            }
        },
        {
            "type": "function",
            "function": {
                "name": "read_file",
                "description": "Read a UTF-8 text file inside the workspace. Files over 1 MiB are blocked; use read_file_paged for those.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "path": { "type": "string", "description": "Path relative to the workspace root" }
                    },
                    "required": ["path"],
                    "additionalProperties": false
                }
            }
        },
        {
            "type": "function",
            "function": {
                "name": "run_command",
                "description": "Run an allowlisted program inside the workspace without a shell. Pass each argument as its own element. Shell metacharacters (; | & $ ` > <) are blocked.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "command_parts": {
                            "type": "array",
                            "items": { "type": "string" },
                            "description": "Program followed by its arguments, e.g. ['git', 'status']"
                        }
                    },
                    "required": ["command_parts"],
                    "additionalProperties": false
                }
            }
        },
        {
            "type": "function",
            "function": {
                "name": "web_request",
                "description": "Fetch a public http(s) URL with GET or HEAD. Private, loopback and reserved addresses are blocked. The body is cut at 50 KiB.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "url": { "type": "string", "description": "Absolute http or https URL" },
                        "method": { "type": "string", "enum": ["GET", "HEAD"], "description": "Defaults to GET" }
                    },
                    "required": ["url"],
                    "additionalProperties": false
                }
            }
        },
        {
            "type": "function",
            "function": {
                "name": "read_file_paged",
                "description": "Read a byte range of a file inside the workspace. Works for files of any size.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "path": { "type": "string", "description": "Path relative to the workspace root" },
                        "offset": { "type": "integer", "description": "Byte offset to start at (default 0)" },
                        "limit": { "type": "integer", "description": "Number of bytes to read (default 2000)" }
                    },
                    "required": ["path"],
                    "additionalProperties": false
                }
            }
        },
        {
            "type": "function",
            "function": {
                "name": "search_in_file",
                "description": "Return every line of a workspace file that contains a literal substring.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "path": { "type": "string", "description": "Path relative to the workspace root" },
                        "pattern": { "type": "string", "description": "Literal text to look for" },
                        "case_sensitive": { "type": "boolean", "description": "Defaults to false" }
                    },
                    "required": ["path", "pattern"],
                    "additionalProperties": false
                }
            }
        }
    ])
    .as_array()
    .cloned()
    .unwrap_or_default()
}

/// Dispatches model tool calls through a [`Firewall`]
#[derive(Debug, Clone, Copy)]
pub struct ToolExecutor<'a> {
    firewall: &'a Firewall,
}

impl<'a> ToolExecutor<'a> {
    pub fn new(firewall: &'a Firewall) -> Self {
        Self { firewall }
    }

    pub fn action_for(tool_name: &str) -> Option<Action> {
        TOOL_ACTIONS
            .iter()
            .find(|(name, _)| *name == tool_name)
            .map(|(_, action)| *action)
    }

    /// Run one tool call and return the result as compact JSON text
    pub async fn execute_tool_call(&self, tool_name: &str, arguments: &Value) -> String {
        let Some(action) = Self::action_for(tool_name) else {
            warn!(tool = %tool_name, "unknown tool call");
            let result = ValidationResult::error(
                None,
                format!("Unknown tool '{tool_name}'. Available tools: [{}]", available_tools()),
            );
            return result.to_json().to_string();
        };

        let result = self.firewall.validate(action.as_str(), arguments).await;
        info!(tool = %tool_name, action = %action, status = %result.status(), "tool call handled");
        result.to_json().to_string()
    }

    /// Run a batch of OpenAI-style `tool_calls` and build the `role: "tool"`
    /// messages to append to the conversation.
    ///
    /// `function.arguments` may be a JSON string or an object. Arguments that
    /// do not parse are replaced by `{}`, so the firewall reports what is
    /// missing instead of the batch failing.
    pub async fn execute_tool_calls(&self, tool_calls: &[Value]) -> Vec<Value> {
        let mut messages = Vec::with_capacity(tool_calls.len());

        for call in tool_calls {
            let call_id = call.get("id").and_then(Value::as_str).unwrap_or("unknown");
            let function = call.get("function");
            let name = function
                .and_then(|f| f.get("name"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            let arguments = parse_arguments(function.and_then(|f| f.get("arguments")));

            let content = self.execute_tool_call(name, &arguments).await;
            messages.push(json!({
                "role": "tool",
                "tool_call_id": call_id,
                "content": content,
            }));
        }

        messages
    }
}

fn parse_arguments(raw: Option<&Value>) -> Value {
    match raw {
        Some(Value::String(text)) => serde_json::from_str(text).unwrap_or_else(|_| json!({})),
        Some(v @ Value::Object(_)) => v.clone(),
        _ => json!({}),
    }
}
