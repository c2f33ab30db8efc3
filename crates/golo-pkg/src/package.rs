//! Package descriptors and project layout conventions.
//!
//! A package is a single directory of source files. Its module identifier is
//! never read from the source itself; it is derived from where the directory
//! sits relative to an identifier prefix, so the same tree can be resolved
//! under different roots:
//! ```text
//! project/                    prefix = "example.com/app"
//! ├── main.go                 -> example.com/app
//! ├── server/
//! │   └── server.go           -> example.com/app/server
//! ├── testdata/               (never scanned)
//! ├── vendor/                 (resolution fallback, never scanned)
//! └── .golo/
//!     ├── cache/              pinned snapshots
//!     └── pkg/                compiled archives
//! ```

use serde::Serialize;
use std::path::{Component, Path, PathBuf};

/// Source file extension.
pub const SOURCE_EXT: &str = "go";

/// Suffix marking a test file (excluded from builds).
pub const TEST_FILE_SUFFIX: &str = "_test.go";

/// Reserved directory holding test fixtures.
pub const TESTDATA_DIR: &str = "testdata";

/// Reserved directory holding vendored dependencies.
pub const VENDOR_DIR: &str = "vendor";

/// Per-project tool directory.
pub const TOOL_DIR: &str = ".golo";

/// Cache directory under [`TOOL_DIR`].
pub const CACHE_DIR: &str = "cache";

/// Compiled package directory under [`TOOL_DIR`].
pub const PKG_DIR: &str = "pkg";

/// Pseudo-import used for foreign function bindings.
pub const CGO_IMPORT: &str = "C";

/// One resolvable unit of source: a directory and what it imports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageDescriptor {
    /// Module identifier assigned by the scanner or resolver.
    pub module_id: String,

    /// Directory containing the package's source files.
    pub dir: PathBuf,

    /// Name declared in the `package` clause.
    pub name: String,

    /// Imported module identifiers, sorted and deduplicated.
    pub imports: Vec<String>,

    /// Buildable source file names for the current target.
    pub source_files: Vec<String>,

    /// Source files present in the directory but excluded for this target.
    pub ignored_files: Vec<String>,

    /// Whether any buildable file imports `"C"`.
    pub uses_cgo: bool,
}

impl PackageDescriptor {
    /// Whether this package builds an executable.
    #[must_use]
    pub fn is_command(&self) -> bool {
        self.name == "main"
    }

    /// Last element of the module identifier.
    #[must_use]
    pub fn base_name(&self) -> &str {
        self.module_id
            .rsplit('/')
            .next()
            .unwrap_or(&self.module_id)
    }

    /// Full paths of the buildable source files.
    pub fn source_paths(&self) -> impl Iterator<Item = PathBuf> + '_ {
        self.source_files.iter().map(|f| self.dir.join(f))
    }
}

/// Whether a directory entry is excluded from scanning.
#[must_use]
pub fn is_ignored_entry(name: &str) -> bool {
    name.starts_with('.') || name.starts_with('_') || name == TESTDATA_DIR || name == VENDOR_DIR
}

/// Derive a module identifier from a prefix and a path relative to the
/// directory the prefix names.
///
/// Components are joined with `/` regardless of platform; `.` components are
/// dropped and `..` pops the previous element. No filesystem access.
#[must_use]
pub fn derive_module_id(prefix: &str, relative: &Path) -> String {
    let mut parts: Vec<String> = prefix
        .split('/')
        .filter(|p| !p.is_empty() && *p != ".")
        .map(str::to_string)
        .collect();

    for component in relative.components() {
        match component {
            Component::Normal(name) => parts.push(name.to_string_lossy().into_owned()),
            Component::ParentDir => {
                parts.pop();
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }

    parts.join("/")
}

/// Whether `module_id` can be mapped to a directory below a root.
///
/// Every `/`-separated element must be non-empty, must not be `.` or `..`,
/// and must not contain a backslash or a drive/root marker.
#[must_use]
pub fn is_valid_module_id(module_id: &str) -> bool {
    !module_id.is_empty()
        && module_id.split('/').all(|part| {
            !part.is_empty()
                && part != "."
                && part != ".."
                && !part.contains(['\\', ':'])
                && !part.chars().any(|c| c.is_whitespace() || c.is_control())
        })
}

/// Path of `module_id` below `root`, one directory per identifier element.
///
/// Callers are expected to have checked the identifier with
/// [`is_valid_module_id`]; `module_dir` only joins elements.
#[must_use]
pub fn module_dir(root: &Path, module_id: &str) -> PathBuf {
    module_id
        .split('/')
        .filter(|p| !p.is_empty())
        .fold(root.to_path_buf(), |dir, part| dir.join(part))
}
