//! `golo cache` subcommands.

use anyhow::{bail, Context, Result};
use golo_pkg::{copy_tree, module_dir, validate_prefix, CacheKey};
use std::path::{Path, PathBuf};

/// Snapshot directory a pinned prefix is served from.
pub fn snapshot_dir(project_root: &Path, key: &CacheKey) -> PathBuf {
    key.dir(project_root)
}

/// Print the cache directory for a pin.
pub fn path(project_root: &Path, key: &CacheKey) {
    println!("{}", snapshot_dir(project_root, key).display());
}

/// Copy `source` into the snapshot so that `<prefix>/...` identifiers
/// resolve from it.
///
/// Returns the directory the tree was copied to.
pub fn import(project_root: &Path, key: &CacheKey, source: &Path) -> Result<PathBuf> {
    validate_prefix(&key.prefix)?;
    if !source.is_dir() {
        bail!("Source directory {} does not exist", source.display());
    }

    let dest = module_dir(&snapshot_dir(project_root, key), &key.prefix);
    let copied = copy_tree(source, &dest).with_context(|| {
        format!(
            "Failed to copy {} into {}",
            source.display(),
            dest.display()
        )
    })?;
    println!("Imported {copied} files for {key} into {}", dest.display());
    Ok(dest)
}
