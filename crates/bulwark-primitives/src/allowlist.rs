//! Command allowlist
//!
//! Only explicitly permitted base commands can run. Everything else is
//! denied by default. The set is fixed once built; there is no global
//! default that gets mutated at runtime.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The minimum a coding agent needs. No curl, wget, nc, dd, rm.
pub const DEFAULT_COMMAND_ALLOWLIST: &[&str] = &[
    "git", "python", "python3", "pip", "pip3", "ls", "cat", "echo", "mkdir",
];

/// Immutable set of permitted base-command names.
///
/// Deserialized from a plain list of names, normalized the same way as
/// [`CommandAllowlist::new`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct CommandAllowlist {
    commands: BTreeSet<String>,
}

impl CommandAllowlist {
    /// Build an allowlist from command names. Blank entries are dropped.
    pub fn new<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            commands: commands
                .into_iter()
                .map(|c| c.as_ref().trim().to_string())
                .filter(|c| !c.is_empty())
                .collect(),
        }
    }

    /// An allowlist that permits nothing
    pub fn empty() -> Self {
        Self::default()
    }

    /// Exact-name membership. `/usr/bin/ls` is not `ls`: a path-qualified
    /// command could point anywhere.
    pub fn contains(&self, command: &str) -> bool {
        self.commands.contains(command)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.commands.iter().map(String::as_str)
    }
}

impl From<Vec<String>> for CommandAllowlist {
    fn from(commands: Vec<String>) -> Self {
        Self::new(commands)
    }
}

impl From<CommandAllowlist> for Vec<String> {
    fn from(list: CommandAllowlist) -> Self {
        list.commands.into_iter().collect()
    }
}

impl fmt::Display for CommandAllowlist {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().collect();
        write!(f, "[{}]", names.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_set_excludes_fetchers() {
        let list = CommandAllowlist::new(DEFAULT_COMMAND_ALLOWLIST);
        assert!(list.contains("git"));
        assert!(list.contains("ls"));
        assert!(!list.contains("curl"));
        assert!(!list.contains("wget"));
        assert!(!list.contains("rm"));
    }

    #[test]
    fn test_path_qualified_command_not_matched() {
        let list = CommandAllowlist::new(["ls"]);
        assert!(!list.contains("/usr/bin/ls"));
        assert!(!list.contains("./ls"));
    }

    #[test]
    fn test_blank_entries_dropped() {
        let list = CommandAllowlist::new(["", "  ", "echo"]);
        assert_eq!(list.len(), 1);
        assert_eq!(list.to_string(), "[echo]");
    }

    #[test]
    fn test_from_list_is_normalized() {
        let list = CommandAllowlist::from(vec![" ls".to_string(), String::new(), "git ".to_string()]);
        assert_eq!(list.len(), 2);
        assert!(list.contains("ls"));
        assert!(list.contains("git"));
        assert_eq!(Vec::<String>::from(list), vec!["git", "ls"]);
    }

    #[test]
    fn test_empty_list() {
        let list = CommandAllowlist::empty();
        assert!(list.is_empty());
        assert!(!list.contains("ls"));
    }
}
