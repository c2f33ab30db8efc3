//! Package discovery and dependency resolution for golo.
//!
//! This crate provides:
//! - Header parsing and build-constraint evaluation for `.go` source files
//! - Loading a directory into a [`PackageDescriptor`] for a build target
//! - Scanning a project tree into its local packages
//! - Resolving the transitive import closure against the standard library,
//!   the project's `vendor` directory and pinned cache snapshots
//! - Content-addressed cache directories
//! - `golo.toml` configuration
//! - Ordering a package set into a build plan

mod cache;
mod constraint;
mod loader;
mod manifest;
mod package;
mod plan;
mod report;
mod resolve;
mod scan;
mod source;

pub use cache::{cache_path, cache_root, copy_tree, CacheKey};
pub use constraint::{Constraint, ConstraintError};
pub use loader::{BuildTarget, LoadError, PackageLoader, KNOWN_ARCH, KNOWN_OS};
pub use manifest::{
    std_root_from_env, validate_prefix, BuildSection, ConfigError, Manifest, PackageSection,
    Pin, ToolchainSection, DEFAULT_STD_ROOT, MANIFEST_FILE,
};
pub use package::{
    derive_module_id, is_ignored_entry, is_valid_module_id, module_dir, PackageDescriptor,
    CACHE_DIR, CGO_IMPORT, PKG_DIR, SOURCE_EXT, TESTDATA_DIR, TEST_FILE_SUFFIX, TOOL_DIR, VENDOR_DIR,
};
pub use plan::{
    BuildContext, BuildError, BuildOutcome, BuildPackage, BuildPlan, Toolchain, PLAN_FILE,
};
pub use report::Reporter;
pub use resolve::{
    PackageSource, PinnedCache, ResolutionSet, ResolveError, Resolver, SourceChain,
    StandardLibrary, Vendor,
};
pub use scan::Scanner;
pub use source::{parse_header, FileHeader, HeaderError};
