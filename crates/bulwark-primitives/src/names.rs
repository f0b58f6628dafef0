//! Filename sanitizing and project-name grammar

use crate::violation::{SecurityViolation, GUARD_FILENAME, GUARD_PROJECT_NAME};

/// Characters no filesystem entry should contain
const UNSAFE_FILENAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Device names Windows refuses to create, with or without an extension
const RESERVED_DEVICE_NAMES: &[&str] = &[
    "con", "prn", "aux", "nul", "com1", "com2", "com3", "com4", "com5", "com6", "com7", "com8",
    "com9", "lpt1", "lpt2", "lpt3", "lpt4", "lpt5", "lpt6", "lpt7", "lpt8", "lpt9",
];

/// Names that shadow tooling or std modules when used as a project name
const RESERVED_PROJECT_NAMES: &[&str] = &[
    "test", "tests", "src", "lib", "build", "dist", "site-packages", "std", "core", "self",
    "super", "crate", "con", "prn", "aux", "nul",
];

const MAX_FILENAME_BYTES: usize = 255;
const MAX_PROJECT_NAME_LEN: usize = 64;

/// Make a single path component safe to create.
///
/// Unsafe and control characters become `_`, trailing dots and spaces are
/// trimmed, reserved device names get a `_` prefix. Only blank input is
/// refused.
pub fn sanitize_filename(name: &str) -> Result<String, SecurityViolation> {
    if name.trim().is_empty() {
        return Err(SecurityViolation::new(GUARD_FILENAME, "Empty filename", name));
    }

    let replaced: String = name
        .chars()
        .map(|c| {
            if c.is_control() || UNSAFE_FILENAME_CHARS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect();

    let trimmed = replaced
        .trim_start_matches(' ')
        .trim_end_matches(|c| c == ' ' || c == '.');

    let mut safe = if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    };

    let stem = safe.split('.').next().unwrap_or_default().to_ascii_lowercase();
    if RESERVED_DEVICE_NAMES.contains(&stem.as_str()) {
        safe.insert(0, '_');
    }

    if safe.len() > MAX_FILENAME_BYTES {
        let mut cut = MAX_FILENAME_BYTES;
        while !safe.is_char_boundary(cut) {
            cut -= 1;
        }
        safe.truncate(cut);
    }

    Ok(safe)
}

/// Validate a proposed project identifier.
///
/// Grammar: an ASCII letter, then ASCII letters, digits, `_` or `-`, at most
/// 64 characters, and not a reserved name.
pub fn validate_project_name(name: &str) -> Result<String, SecurityViolation> {
    let refuse = |message: String| SecurityViolation::new(GUARD_PROJECT_NAME, message, name);

    let Some(first) = name.chars().next() else {
        return Err(refuse("Project name cannot be empty".to_string()));
    };

    if !first.is_ascii_alphabetic() {
        return Err(refuse(format!(
            "Project name must start with a letter, got {first:?}"
        )));
    }

    if name.len() > MAX_PROJECT_NAME_LEN {
        return Err(refuse(format!(
            "Project name is {} characters long. Max: {MAX_PROJECT_NAME_LEN}",
            name.len()
        )));
    }

    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(refuse(format!(
            "Project name contains invalid character {bad:?}"
        )));
    }

    if RESERVED_PROJECT_NAMES.contains(&name.to_ascii_lowercase().as_str()) {
        return Err(refuse(format!("Project name '{name}' is reserved")));
    }

    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_replaces_dangerous_chars() {
        let safe = sanitize_filename("<script>:evil|name?.txt").unwrap();
        assert!(!safe.contains('<'));
        assert!(!safe.contains('>'));
        assert!(!safe.contains(':'));
        assert!(!safe.contains('|'));
        assert!(safe.ends_with(".txt"));
    }

    #[test]
    fn test_sanitize_keeps_dotfiles() {
        assert_eq!(sanitize_filename(".env").unwrap(), ".env");
        assert_eq!(sanitize_filename("README.md").unwrap(), "README.md");
    }

    #[test]
    fn test_sanitize_trailing_dots_and_control() {
        assert_eq!(sanitize_filename("notes. . ").unwrap(), "notes");
        assert_eq!(sanitize_filename("a\tb").unwrap(), "a_b");
        assert_eq!(sanitize_filename("...").unwrap(), "unnamed");
    }

    #[test]
    fn test_sanitize_reserved_device() {
        assert_eq!(sanitize_filename("CON.txt").unwrap(), "_CON.txt");
        assert_eq!(sanitize_filename("nul").unwrap(), "_nul");
    }

    #[test]
    fn test_sanitize_truncates_on_char_boundary() {
        let long = "é".repeat(200);
        let safe = sanitize_filename(&long).unwrap();
        assert!(safe.len() <= MAX_FILENAME_BYTES);
        assert!(safe.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_sanitize_blank_refused() {
        let err = sanitize_filename("   ").unwrap_err();
        assert_eq!(err.guard, GUARD_FILENAME);
    }

    #[test]
    fn test_valid_project_name() {
        assert_eq!(validate_project_name("my_cool_project").unwrap(), "my_cool_project");
        assert!(validate_project_name("web-app2").is_ok());
    }

    #[test]
    fn test_invalid_project_names() {
        assert!(validate_project_name("").is_err());
        assert!(validate_project_name("1project").is_err());
        assert!(validate_project_name("my project").is_err());
        assert!(validate_project_name("../etc").is_err());
        assert!(validate_project_name("Tests").is_err());
        assert!(validate_project_name(&"a".repeat(65)).is_err());
    }

    #[test]
    fn test_project_name_violation_carries_value() {
        let err = validate_project_name("9lives").unwrap_err();
        assert_eq!(err.guard, GUARD_PROJECT_NAME);
        assert_eq!(err.value, "9lives");
    }
}
