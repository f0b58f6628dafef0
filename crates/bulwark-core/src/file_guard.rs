//! Workspace-confined file operations
//!
//! Write, read, paged read and pattern search all resolve their path through
//! the same traversal-guard call against the same root, so a path that one
//! operation rejects is rejected by all of them.

use std::fs::{self, File, Metadata, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bulwark_primitives::violation::GUARD_FILENAME;
use bulwark_primitives::{SecurityPrimitives, SecurityViolation};
use tracing::{debug, info};

use crate::intent::Action;
use crate::result::{ActionOutput, ValidationResult};

/// Guard name for the oversized-read refusal
pub const GUARD_FILE_SIZE: &str = "file_size";

pub struct FileGuard {
    root: PathBuf,
    max_read_bytes: u64,
    primitives: Arc<dyn SecurityPrimitives>,
}

impl FileGuard {
    pub fn new(root: PathBuf, max_read_bytes: u64, primitives: Arc<dyn SecurityPrimitives>) -> Self {
        Self {
            root,
            max_read_bytes,
            primitives,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The single confinement call every operation goes through
    fn resolve(&self, path: &str) -> Result<PathBuf, SecurityViolation> {
        self.primitives.guard_path_traversal(path, &self.root)
    }

    /// Sanitize only the last component; directory structure is kept as-is
    /// so the traversal guard still sees any `..` in it.
    fn sanitized(&self, path: &str) -> Result<String, SecurityViolation> {
        let requested = Path::new(path);
        let name = requested
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                SecurityViolation::new(GUARD_FILENAME, "Path has no file name component", path)
            })?;

        let safe = self.primitives.sanitize_filename(name)?;
        match requested.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                Ok(parent.join(safe).to_string_lossy().into_owned())
            }
            _ => Ok(safe),
        }
    }

    /// Resolve and require an existing regular file
    fn open_regular(
        &self,
        action: Action,
        path: &str,
    ) -> Result<(PathBuf, Metadata), ValidationResult> {
        let resolved = self
            .resolve(path)
            .map_err(|v| ValidationResult::blocked(action, v, path))?;

        let metadata = match fs::metadata(&resolved) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ValidationResult::error(
                    action,
                    format!("File not found: {path}"),
                ))
            }
            Err(e) => {
                return Err(ValidationResult::error(
                    action,
                    format!("Cannot stat {path}: {e}"),
                ))
            }
        };

        if !metadata.is_file() {
            return Err(ValidationResult::error(
                action,
                format!("Path is not a file: {path}"),
            ));
        }

        Ok((resolved, metadata))
    }

    /// Write `content` as a text file, creating parent directories
    pub fn write(&self, path: &str, content: &str) -> ValidationResult {
        let action = Action::WriteFile;

        let resolved = match self.sanitized(path).and_then(|p| self.resolve(&p)) {
            Ok(p) => p,
            Err(v) => return ValidationResult::blocked(action, v, path),
        };

        if let Some(parent) = resolved.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                return ValidationResult::error(
                    action,
                    format!("Failed to create parent directories for {path}: {e}"),
                );
            }
        }

        if let Err(e) = write_no_follow(&resolved, content.as_bytes()) {
            return ValidationResult::error(action, format!("Failed to write {path}: {e}"));
        }

        info!(path = %resolved.display(), bytes = content.len(), "file written");
        ValidationResult::Success(ActionOutput::WriteFile {
            path: resolved,
            bytes_written: content.len(),
        })
    }

    /// Read a whole UTF-8 file, refusing anything over the size cap
    pub fn read(&self, path: &str) -> ValidationResult {
        let action = Action::ReadFile;
        let (resolved, metadata) = match self.open_regular(action, path) {
            Ok(found) => found,
            Err(result) => return result,
        };

        let size = metadata.len();
        if size > self.max_read_bytes {
            return ValidationResult::refused(
                action,
                GUARD_FILE_SIZE,
                format!(
                    "File too large ({size} bytes). Max: {} bytes. Use paged_read instead.",
                    self.max_read_bytes
                ),
                path,
            );
        }

        let bytes = match fs::read(&resolved) {
            Ok(b) => b,
            Err(e) => return ValidationResult::error(action, format!("Failed to read {path}: {e}")),
        };

        let content = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(_) => {
                return ValidationResult::error(
                    action,
                    format!("File is not valid UTF-8 text: {path}. Use paged_read instead."),
                )
            }
        };

        info!(path = %resolved.display(), bytes = size, "file read");
        ValidationResult::Success(ActionOutput::ReadFile {
            path: resolved,
            content,
            size_bytes: size,
        })
    }

    /// Read `limit` bytes starting at byte `offset`.
    ///
    /// Negative values clamp to zero. The byte range is decoded lossily, so a
    /// multi-byte character split by the range shows up as U+FFFD.
    pub fn read_paged(&self, path: &str, offset: i64, limit: i64) -> ValidationResult {
        let action = Action::PagedRead;
        let (resolved, _) = match self.open_regular(action, path) {
            Ok(found) => found,
            Err(result) => return result,
        };

        let offset = offset.max(0) as u64;
        let limit = limit.max(0) as u64;

        let bytes = match read_range(&resolved, offset, limit) {
            Ok(b) => b,
            Err(e) => return ValidationResult::error(action, format!("Failed to read {path}: {e}")),
        };

        debug!(path = %resolved.display(), offset, limit, read = bytes.len(), "paged read");
        ValidationResult::Success(ActionOutput::PagedRead {
            path: resolved,
            offset,
            limit,
            bytes_read: bytes.len(),
            content: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }

    /// Every line containing `pattern` literally, in file order.
    ///
    /// The file is streamed line by line; only matching lines are kept. A
    /// line longer than the read cap is searched and returned only up to the
    /// cap, and `lines_truncated` reports that it happened.
    pub fn search(&self, path: &str, pattern: &str, case_sensitive: bool) -> ValidationResult {
        let action = Action::PatternSearch;
        let (resolved, _) = match self.open_regular(action, path) {
            Ok(found) => found,
            Err(result) => return result,
        };

        let (matches, lines_truncated) =
            match search_lines(&resolved, pattern, case_sensitive, self.max_read_bytes) {
                Ok(found) => found,
                Err(e) => {
                    return ValidationResult::error(action, format!("Failed to search {path}: {e}"))
                }
            };

        debug!(path = %resolved.display(), pattern = %pattern, hits = matches.len(), "pattern search");
        ValidationResult::Success(ActionOutput::PatternSearch {
            path: resolved,
            pattern: pattern.to_string(),
            case_sensitive,
            matches,
            lines_truncated,
        })
    }
}

/// Create or truncate `path` without following a final-component symlink,
/// so a link swapped in after the path check cannot redirect the write.
fn write_no_follow(path: &Path, content: &[u8]) -> io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.custom_flags(libc::O_NOFOLLOW | libc::O_CLOEXEC);
    options.open(path)?.write_all(content)
}

fn read_range(path: &Path, offset: u64, limit: u64) -> io::Result<Vec<u8>> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    let mut bytes = Vec::new();
    file.take(limit).read_to_end(&mut bytes)?;
    Ok(bytes)
}

/// Matching lines plus whether any line was longer than `max_line_bytes`.
///
/// Memory is bounded by `max_line_bytes`: an over-long line is searched and
/// returned only up to the cap, and the rest of it is skipped.
fn search_lines(
    path: &Path,
    pattern: &str,
    case_sensitive: bool,
    max_line_bytes: u64,
) -> io::Result<(Vec<String>, bool)> {
    let needle = if case_sensitive {
        pattern.to_string()
    } else {
        pattern.to_lowercase()
    };

    let mut reader = BufReader::new(File::open(path)?);
    let mut raw = Vec::new();
    let mut matches = Vec::new();
    let mut truncated = false;

    loop {
        raw.clear();
        let read = (&mut reader).take(max_line_bytes).read_until(b'\n', &mut raw)?;
        if read == 0 {
            break;
        }
        if raw.last() != Some(&b'\n') && read as u64 == max_line_bytes && skip_line(&mut reader)? {
            truncated = true;
        }

        let decoded = String::from_utf8_lossy(&raw);
        let line = decoded.strip_suffix('\n').unwrap_or(&decoded);
        let line = line.strip_suffix('\r').unwrap_or(line);

        let hit = if case_sensitive {
            line.contains(&needle)
        } else {
            line.to_lowercase().contains(&needle)
        };
        if hit {
            matches.push(line.to_string());
        }
    }

    Ok((matches, truncated))
}

/// Discard input through the next newline. Returns whether any bytes other
/// than the newline itself were dropped.
fn skip_line<R: BufRead>(reader: &mut R) -> io::Result<bool> {
    let mut skipped = false;
    loop {
        let (consumed, done) = {
            let buf = reader.fill_buf()?;
            if buf.is_empty() {
                return Ok(skipped);
            }
            match buf.iter().position(|&b| b == b'\n') {
                Some(i) => (i + 1, true),
                None => (buf.len(), false),
            }
        };
        reader.consume(consumed);
        if done {
            return Ok(skipped || consumed > 1);
        }
        skipped = true;
    }
}
