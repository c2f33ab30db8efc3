//! Content-addressed cache directories for pinned package snapshots.
//!
//! A scope such as `example.com/foo` + `rev` + `=` + `v1.2.0` hashes to a
//! two-level directory so the cache root never holds more than 256 entries:
//! ```text
//! <project>/.golo/cache/3f/9a0c…e1/example.com/foo/...
//! ```

use crate::package::{CACHE_DIR, TOOL_DIR};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// The scope a cache directory is derived from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Module identifier prefix the snapshot serves.
    pub prefix: String,
    /// Kind of pin, e.g. `rev` or `version`.
    pub kind: String,
    /// Pin argument, e.g. a revision.
    pub arg: String,
}

impl CacheKey {
    #[must_use]
    pub fn new(prefix: impl Into<String>, kind: impl Into<String>, arg: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            kind: kind.into(),
            arg: arg.into(),
        }
    }

    /// The scope string that is hashed: `prefix + kind + "=" + arg`.
    #[must_use]
    pub fn scope(&self) -> String {
        format!("{}{}={}", self.prefix, self.kind, self.arg)
    }

    /// Cache directory for this key under `project_root`.
    #[must_use]
    pub fn dir(&self, project_root: &Path) -> PathBuf {
        cache_path(project_root, &self.scope())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}={}", self.prefix, self.kind, self.arg)
    }
}

/// Root of the cache for a project.
#[must_use]
pub fn cache_root(project_root: &Path) -> PathBuf {
    project_root.join(TOOL_DIR).join(CACHE_DIR)
}

/// Derive the cache directory for a scope string.
///
/// The first digest byte names the shard directory and the remaining bytes
/// name the leaf, both hex-encoded. Pure: nothing is created or checked.
#[must_use]
pub fn cache_path(project_root: &Path, scope: &str) -> PathBuf {
    let digest = Sha256::digest(scope.as_bytes());
    cache_root(project_root)
        .join(hex::encode(&digest[..1]))
        .join(hex::encode(&digest[1..]))
}

/// Copy a source tree into a directory, skipping version-control metadata
/// and golo's own tool directory.
///
/// Anything already at `dst` is removed first. Returns the number of files
/// copied.
///
/// # Errors
///
/// Fails with [`io::ErrorKind::InvalidInput`] when one of the two trees
/// contains the other, before anything is removed or written.
pub fn copy_tree(src: &Path, dst: &Path) -> io::Result<usize> {
    let src_real = fs::canonicalize(src)?;
    let dst_real = canonical_target(dst)?;
    if dst_real.starts_with(&src_real) || src_real.starts_with(&dst_real) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "cannot copy {} into {}: one contains the other",
                src.display(),
                dst.display()
            ),
        ));
    }

    if dst.exists() {
        fs::remove_dir_all(dst)?;
    }
    fs::create_dir_all(dst)?;
    copy_dir_contents(src, dst)
}

/// Resolve `path` through its nearest existing ancestor; the missing tail
/// is appended unchanged.
fn canonical_target(path: &Path) -> io::Result<PathBuf> {
    let mut missing = Vec::new();
    let mut current = path;
    loop {
        match fs::canonicalize(current) {
            Ok(real) => return Ok(missing.iter().rev().fold(real, |dir, name| dir.join(name))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let (Some(parent), Some(name)) = (current.parent(), current.file_name()) else {
                    return Err(e);
                };
                missing.push(name.to_os_string());
                current = if parent.as_os_str().is_empty() {
                    Path::new(".")
                } else {
                    parent
                };
            }
            Err(e) => return Err(e),
        }
    }
}

fn copy_dir_contents(src: &Path, dst: &Path) -> io::Result<usize> {
    let mut copied = 0;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let name = entry.file_name();
        if name == ".git" || name == TOOL_DIR {
            continue;
        }
        let from = entry.path();
        let to = dst.join(&name);
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            fs::create_dir_all(&to)?;
            copied += copy_dir_contents(&from, &to)?;
        } else if file_type.is_file() {
            fs::copy(&from, &to)?;
            copied += 1;
        }
    }
    Ok(copied)
}
