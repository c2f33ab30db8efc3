//! Dependency resolution for scanned packages.
//!
//! This module provides:
//! - Package sources that map a module identifier to a directory
//!   (standard library root, project vendor directory, pinned cache snapshots)
//! - An ordered chain of sources tried in sequence
//! - Expansion of an initial package set into its transitive import closure,
//!   loading every module identifier exactly once

use crate::cache::CacheKey;
use crate::loader::{LoadError, PackageLoader};
use crate::package::{is_valid_module_id, module_dir, PackageDescriptor, VENDOR_DIR};
use crate::report::Reporter;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during discovery and resolution.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// No package source provides the module identifier.
    #[error("cannot resolve import \"{0}\": not in the standard library or vendor directory")]
    NotFound(String),

    /// A directory could not be listed or inspected.
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A located package could not be loaded.
    #[error("package {module_id}: {source}")]
    MalformedSource {
        module_id: String,
        #[source]
        source: LoadError,
    },

    /// The module identifier cannot name a directory below a source root.
    #[error("invalid module identifier \"{0}\"")]
    InvalidModuleId(String),

    /// A pinned snapshot is expected to hold the package but does not.
    #[error("pinned package {module_id} missing from cache: {} does not exist", .path.display())]
    PinnedMissing { module_id: String, path: PathBuf },
}

impl ResolveError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// The module identifier the error is about, if any.
    #[must_use]
    pub fn module_id(&self) -> Option<&str> {
        match self {
            Self::NotFound(id) | Self::InvalidModuleId(id) => Some(id),
            Self::MalformedSource { module_id, .. } | Self::PinnedMissing { module_id, .. } => {
                Some(module_id)
            }
            Self::Io { .. } => None,
        }
    }
}

/// Directory of `module_id` below `root`, rejecting identifiers whose
/// elements would leave it.
fn checked_dir(root: &Path, module_id: &str) -> Result<PathBuf, ResolveError> {
    if !is_valid_module_id(module_id) {
        return Err(ResolveError::InvalidModuleId(module_id.to_string()));
    }
    Ok(module_dir(root, module_id))
}

/// Something that can locate the directory holding a module identifier.
pub trait PackageSource: fmt::Debug {
    /// Short description used in verbose output.
    fn describe(&self) -> String;

    /// Locate `module_id`.
    ///
    /// `Ok(None)` passes the request on to the next source in a chain.
    fn locate(&self, module_id: &str) -> Result<Option<PathBuf>, ResolveError>;
}

/// Packages under the standard library root.
#[derive(Debug, Clone)]
pub struct StandardLibrary {
    root: PathBuf,
}

impl StandardLibrary {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl PackageSource for StandardLibrary {
    fn describe(&self) -> String {
        format!("standard library {}", self.root.display())
    }

    fn locate(&self, module_id: &str) -> Result<Option<PathBuf>, ResolveError> {
        let dir = checked_dir(&self.root, module_id)?;
        Ok(dir.is_dir().then_some(dir))
    }
}

/// Packages under the project's `vendor` directory.
#[derive(Debug, Clone)]
pub struct Vendor {
    dir: PathBuf,
}

impl Vendor {
    /// Vendor directory of `project_root`.
    #[must_use]
    pub fn new(project_root: &Path) -> Self {
        Self {
            dir: project_root.join(VENDOR_DIR),
        }
    }
}

impl PackageSource for Vendor {
    fn describe(&self) -> String {
        format!("vendor {}", self.dir.display())
    }

    fn locate(&self, module_id: &str) -> Result<Option<PathBuf>, ResolveError> {
        let dir = checked_dir(&self.dir, module_id)?;
        Ok(dir.is_dir().then_some(dir))
    }
}

/// Serves every module identifier under a prefix from a cached snapshot.
#[derive(Debug, Clone)]
pub struct PinnedCache {
    key: CacheKey,
    dir: PathBuf,
}

impl PinnedCache {
    /// Pin `prefix` to the snapshot derived from `prefix + kind + "=" + arg`.
    #[must_use]
    pub fn register(project_root: &Path, prefix: &str, kind: &str, arg: &str) -> Self {
        let key = CacheKey::new(prefix, kind, arg);
        let dir = key.dir(project_root);
        Self { key, dir }
    }

    #[must_use]
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Snapshot directory identifiers are looked up in.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether requests for `module_id` are served by this pin.
    #[must_use]
    pub fn covers(&self, module_id: &str) -> bool {
        module_id.starts_with(&self.key.prefix)
    }
}

impl PackageSource for PinnedCache {
    fn describe(&self) -> String {
        format!("pinned {}", self.key)
    }

    fn locate(&self, module_id: &str) -> Result<Option<PathBuf>, ResolveError> {
        if !self.covers(module_id) {
            return Ok(None);
        }
        let dir = checked_dir(&self.dir, module_id)?;
        if !dir.exists() {
            return Err(ResolveError::PinnedMissing {
                module_id: module_id.to_string(),
                path: dir,
            });
        }
        Ok(Some(dir))
    }
}

/// Package sources tried in order; the first to locate an identifier wins.
#[derive(Debug, Default)]
pub struct SourceChain {
    sources: Vec<Box<dyn PackageSource>>,
}

impl SourceChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard lookup order: standard library, then vendor.
    #[must_use]
    pub fn standard(project_root: &Path, std_root: &Path) -> Self {
        Self::new()
            .with(StandardLibrary::new(std_root))
            .with(Vendor::new(project_root))
    }

    /// Append a source, tried after those already present.
    #[must_use]
    pub fn with(mut self, source: impl PackageSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    /// Insert a source ahead of all others.
    #[must_use]
    pub fn with_first(mut self, source: impl PackageSource + 'static) -> Self {
        self.sources.insert(0, Box::new(source));
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn PackageSource> {
        self.sources.iter().map(|s| s.as_ref())
    }

    /// Locate `module_id`, returning its directory and the source that
    /// provided it.
    pub fn locate(&self, module_id: &str) -> Result<(PathBuf, &dyn PackageSource), ResolveError> {
        for source in &self.sources {
            if let Some(dir) = source.locate(module_id)? {
                return Ok((dir, source.as_ref()));
            }
        }
        Err(ResolveError::NotFound(module_id.to_string()))
    }
}

/// Module identifiers already resolved in a run.
#[derive(Debug, Clone, Default)]
pub struct ResolutionSet {
    seen: HashSet<String>,
}

impl ResolutionSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `module_id` as seen. Returns `false` if it already was.
    pub fn insert(&mut self, module_id: &str) -> bool {
        if self.seen.contains(module_id) {
            return false;
        }
        self.seen.insert(module_id.to_string())
    }

    #[must_use]
    pub fn contains(&self, module_id: &str) -> bool {
        self.seen.contains(module_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl<'a> Extend<&'a str> for ResolutionSet {
    fn extend<I: IntoIterator<Item = &'a str>>(&mut self, iter: I) {
        self.seen.extend(iter.into_iter().map(str::to_string));
    }
}

/// Expands a package set into its transitive import closure.
#[derive(Debug)]
pub struct Resolver {
    chain: SourceChain,
    loader: PackageLoader,
    reporter: Reporter,
}

impl Resolver {
    /// Create a resolver that locates packages with `chain` and loads them
    /// with `loader`.
    #[must_use]
    pub fn new(chain: SourceChain, loader: PackageLoader) -> Self {
        Self {
            chain,
            loader,
            reporter: Reporter::quiet(),
        }
    }

    /// Enable verbose output.
    #[must_use]
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.reporter = Reporter::new(verbose);
        self
    }

    #[must_use]
    pub fn chain(&self) -> &SourceChain {
        &self.chain
    }

    /// Locate and load a single package.
    ///
    /// The descriptor's module identifier is always `module_id`, whatever
    /// directory it was found in.
    pub fn load(&self, module_id: &str) -> Result<PackageDescriptor, ResolveError> {
        let (dir, source) = self.chain.locate(module_id)?;
        self.reporter.report(format_args!(
            "resolved {} in {} ({})",
            module_id,
            source.describe(),
            dir.display()
        ));
        self.loader
            .load_dir(&dir, module_id)
            .map_err(|source| ResolveError::MalformedSource {
                module_id: module_id.to_string(),
                source,
            })
    }

    /// Return `initial` followed by every package it transitively imports,
    /// each exactly once.
    ///
    /// # Errors
    ///
    /// Fails on the first import that cannot be located or loaded; no
    /// partial result is returned.
    pub fn resolve(
        &self,
        initial: Vec<PackageDescriptor>,
    ) -> Result<Vec<PackageDescriptor>, ResolveError> {
        let mut packages = initial;
        let mut seen = ResolutionSet::new();
        self.resolve_into(&mut packages, &mut seen)?;
        Ok(packages)
    }

    /// Expand `packages` in place, recording every identifier in `seen`.
    ///
    /// Identifiers of the packages already present are marked seen first, so
    /// local packages are never looked up as dependencies. Identifiers that
    /// `seen` already holds are skipped. Imports are walked depth-first in
    /// declaration order; a package is appended when first reached.
    pub fn resolve_into(
        &self,
        packages: &mut Vec<PackageDescriptor>,
        seen: &mut ResolutionSet,
    ) -> Result<(), ResolveError> {
        seen.extend(packages.iter().map(|p| p.module_id.as_str()));

        let roots = packages.len();
        for idx in 0..roots {
            let mut pending: Vec<String> = packages[idx].imports.iter().rev().cloned().collect();

            while let Some(module_id) = pending.pop() {
                if !seen.insert(&module_id) {
                    self.reporter
                        .report(format_args!("  skipping {module_id}, already seen"));
                    continue;
                }
                let package = self.load(&module_id)?;
                pending.extend(package.imports.iter().rev().cloned());
                packages.push(package);
            }
        }

        Ok(())
    }
}
