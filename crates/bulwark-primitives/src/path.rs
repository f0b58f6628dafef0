//! Workspace path confinement
//!
//! A requested path is accepted only if it resolves, after lexical
//! normalization and resolution of every symlink along it, to a
//! location at or below the base directory.

use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::violation::{SecurityViolation, GUARD_PATH_TRAVERSAL};

/// Percent-decoding passes before we give up (catches `%252e%252e`)
const MAX_DECODE_PASSES: usize = 3;

/// Resolve `path` against `base_dir`, refusing anything that escapes it.
///
/// Rejected outright:
/// - NUL bytes
/// - a leading `~` (home-directory expansion)
/// - percent-encoded `..` segments, however many times encoded
///
/// Plain `..` segments are allowed as long as the normalized result stays
/// inside the base directory.
pub fn guard_path_traversal(path: &str, base_dir: &Path) -> Result<PathBuf, SecurityViolation> {
    if path.contains('\0') {
        return Err(violation("Path traversal detected: NUL byte in path", path));
    }

    if path.starts_with('~') {
        return Err(violation(
            "Path traversal detected: home-directory expansion is not allowed",
            path,
        ));
    }

    let decoded = percent_decode(path);
    if decoded != path && (has_dotdot_segment(&decoded) || decoded.contains('\0')) {
        return Err(violation(
            "Path traversal detected: encoded traversal sequence",
            path,
        ));
    }

    let base = base_dir.canonicalize().map_err(|e| {
        violation(
            format!("Path traversal guard cannot resolve base directory: {e}"),
            base_dir.display().to_string(),
        )
    })?;

    let requested = Path::new(path);
    let joined = if requested.is_absolute() {
        requested.to_path_buf()
    } else {
        base.join(requested)
    };

    let normalized = match normalize(&joined) {
        Some(p) if p.starts_with(&base) => p,
        _ => {
            return Err(violation(
                format!(
                    "Path traversal detected: '{path}' resolves outside {}",
                    base.display()
                ),
                path,
            ))
        }
    };

    // Symlinks inside the workspace may still point out of it
    let resolved = resolve_links(&normalized, &base, path)?;

    debug!(requested = %path, resolved = %resolved.display(), "path confined");
    Ok(resolved)
}

fn violation(message: impl Into<String>, value: impl Into<String>) -> SecurityViolation {
    SecurityViolation::new(GUARD_PATH_TRAVERSAL, message, value)
}

fn percent_decode(raw: &str) -> String {
    let mut current = raw.to_string();
    for _ in 0..MAX_DECODE_PASSES {
        let next = match urlencoding::decode(&current) {
            Ok(decoded) => decoded.into_owned(),
            Err(_) => break,
        };
        if next == current {
            break;
        }
        current = next;
    }
    current
}

fn has_dotdot_segment(path: &str) -> bool {
    path.split(&['/', '\\'][..]).any(|segment| segment == "..")
}

/// Collapse `.` and `..` without touching the filesystem. Returns `None`
/// when `..` would climb above the filesystem root.
fn normalize(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(p) => out.push(p.as_os_str()),
            Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    return None;
                }
            }
            Component::Normal(part) => out.push(part),
        }
    }
    Some(out)
}

/// Walk `path` below `base` one component at a time, following every
/// symlink met on the way. A link must lead to an existing target inside
/// `base`; dangling links are refused because writing through one would
/// create its target wherever it points. Components past the first missing
/// one are appended as-is, since a missing entry cannot be a link.
fn resolve_links(
    path: &Path,
    base: &Path,
    requested: &str,
) -> Result<PathBuf, SecurityViolation> {
    let Ok(relative) = path.strip_prefix(base) else {
        return Err(violation(
            format!(
                "Path traversal detected: '{requested}' resolves outside {}",
                base.display()
            ),
            requested,
        ));
    };

    let mut current = base.to_path_buf();
    let mut components = relative.components();

    while let Some(component) = components.next() {
        let candidate = current.join(component);
        match fs::symlink_metadata(&candidate) {
            Ok(meta) if meta.file_type().is_symlink() => {
                let target = candidate.canonicalize().map_err(|_| {
                    violation(
                        format!(
                            "Path traversal detected: '{requested}' goes through dangling symlink {}",
                            candidate.display()
                        ),
                        requested,
                    )
                })?;
                if !target.starts_with(base) {
                    return Err(violation(
                        format!(
                            "Path traversal detected: '{requested}' escapes {} through a symlink",
                            base.display()
                        ),
                        requested,
                    ));
                }
                current = target;
            }
            Ok(_) => current = candidate,
            Err(_) => {
                current = candidate;
                current.extend(components);
                break;
            }
        }
    }

    Ok(current)
}
