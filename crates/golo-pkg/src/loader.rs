//! Loading a directory of source files as a package.

use crate::package::{PackageDescriptor, CGO_IMPORT, SOURCE_EXT, TEST_FILE_SUFFIX};
use crate::source::{parse_header, HeaderError};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Operating systems recognized in file-name suffixes and build tags.
pub const KNOWN_OS: &[&str] = &[
    "aix", "android", "darwin", "dragonfly", "freebsd", "hurd", "illumos", "ios", "js", "linux",
    "nacl", "netbsd", "openbsd", "plan9", "solaris", "wasip1", "windows", "zos",
];

/// Architectures recognized in file-name suffixes and build tags.
pub const KNOWN_ARCH: &[&str] = &[
    "386", "amd64", "amd64p32", "arm", "armbe", "arm64", "arm64be", "loong64", "mips", "mipsle",
    "mips64", "mips64le", "mips64p32", "mips64p32le", "ppc", "ppc64", "ppc64le", "riscv",
    "riscv64", "s390", "s390x", "sparc", "sparc64", "wasm",
];

/// Operating systems that satisfy the `unix` build tag.
const UNIX_OS: &[&str] = &[
    "aix", "android", "darwin", "dragonfly", "freebsd", "hurd", "illumos", "ios", "linux",
    "netbsd", "openbsd", "solaris",
];

/// Errors that can occur when loading a package directory.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("no buildable source files in {}", .dir.display())]
    NoBuildableSource { dir: PathBuf },

    #[error("found packages {first} ({first_file}) and {second} ({second_file}) in {}", .dir.display())]
    MultiplePackages {
        dir: PathBuf,
        first: String,
        first_file: String,
        second: String,
        second_file: String,
    },

    #[error("{}: {source}", .file.display())]
    Syntax {
        file: PathBuf,
        #[source]
        source: HeaderError,
    },

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LoadError {
    /// Whether the directory simply holds no source for this target.
    #[must_use]
    pub fn is_no_source(&self) -> bool {
        matches!(self, Self::NoBuildableSource { .. })
    }

    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// The (operating system, architecture) pair a build is for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildTarget {
    /// Target operating system, e.g. `linux`.
    pub os: String,
    /// Target architecture, e.g. `amd64`.
    pub arch: String,
    /// Extra build tags that are satisfied.
    pub tags: Vec<String>,
    /// Whether the `cgo` tag is satisfied.
    pub cgo: bool,
}

impl BuildTarget {
    /// Target for an explicit pair.
    #[must_use]
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
            tags: Vec::new(),
            cgo: false,
        }
    }

    /// Target matching the machine this program runs on.
    #[must_use]
    pub fn host() -> Self {
        let os = match std::env::consts::OS {
            "macos" => "darwin",
            other => other,
        };
        let arch = match std::env::consts::ARCH {
            "x86_64" => "amd64",
            "x86" => "386",
            "aarch64" => "arm64",
            "powerpc64" => "ppc64",
            "loongarch64" => "loong64",
            other => other,
        };
        Self::new(os, arch)
    }

    /// Add extra build tags.
    #[must_use]
    pub fn with_tags(mut self, tags: impl IntoIterator<Item = String>) -> Self {
        self.tags.extend(tags);
        self
    }

    /// Whether a build tag holds for this target.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        if tag == self.os || tag == self.arch || tag == "gc" {
            return true;
        }
        if tag == "cgo" {
            return self.cgo;
        }
        if tag == "unix" {
            return UNIX_OS.contains(&self.os.as_str());
        }
        // Implied operating systems.
        if (tag == "linux" && self.os == "android")
            || (tag == "solaris" && self.os == "illumos")
            || (tag == "darwin" && self.os == "ios")
        {
            return true;
        }
        if is_release_tag(tag) {
            return true;
        }
        self.tags.iter().any(|t| t == tag)
    }

    /// Whether a file name's `_os`, `_arch` or `_os_arch` suffix matches.
    ///
    /// The part before the first underscore never constrains, so `linux.go`
    /// builds everywhere.
    #[must_use]
    pub fn matches_file_name(&self, file_name: &str) -> bool {
        let stem = file_name.strip_suffix(".go").unwrap_or(file_name);
        let Some(idx) = stem.find('_') else {
            return true;
        };
        let parts: Vec<&str> = stem[idx..].split('_').collect();
        let n = parts.len();

        if n >= 2 && KNOWN_OS.contains(&parts[n - 2]) && KNOWN_ARCH.contains(&parts[n - 1]) {
            return self.has_tag(parts[n - 2]) && self.has_tag(parts[n - 1]);
        }
        if n >= 1 && (KNOWN_OS.contains(&parts[n - 1]) || KNOWN_ARCH.contains(&parts[n - 1])) {
            return self.has_tag(parts[n - 1]);
        }
        true
    }
}

impl Default for BuildTarget {
    fn default() -> Self {
        Self::host()
    }
}

impl std::fmt::Display for BuildTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.os, self.arch)
    }
}

/// `go1.N` release tags are always satisfied.
fn is_release_tag(tag: &str) -> bool {
    tag.strip_prefix("go1.")
        .is_some_and(|minor| !minor.is_empty() && minor.chars().all(|c| c.is_ascii_digit()))
}

/// Loads package directories for one build target.
#[derive(Debug, Clone, Default)]
pub struct PackageLoader {
    target: BuildTarget,
}

impl PackageLoader {
    /// Create a loader for a target.
    #[must_use]
    pub fn new(target: BuildTarget) -> Self {
        Self { target }
    }

    /// The target files are selected for.
    #[must_use]
    pub fn target(&self) -> &BuildTarget {
        &self.target
    }

    /// Load `dir` as the package `module_id`.
    ///
    /// The identifier is supplied by the caller; nothing in the directory
    /// decides it.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::NoBuildableSource`] when no file builds for the
    /// target, and other variants for unreadable or malformed source.
    pub fn load_dir(&self, dir: &Path, module_id: &str) -> Result<PackageDescriptor, LoadError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(dir).map_err(|e| LoadError::io(dir, e))? {
            let entry = entry.map_err(|e| LoadError::io(dir, e))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();

        let mut package: Option<(String, String)> = None;
        let mut imports = BTreeSet::new();
        let mut source_files = Vec::new();
        let mut ignored_files = Vec::new();
        let mut uses_cgo = false;

        for name in names {
            if name.starts_with('.') || name.starts_with('_') {
                continue;
            }
            if Path::new(&name).extension().and_then(|e| e.to_str()) != Some(SOURCE_EXT) {
                continue;
            }
            if name.ends_with(TEST_FILE_SUFFIX) || !self.target.matches_file_name(&name) {
                ignored_files.push(name);
                continue;
            }

            let path = dir.join(&name);
            let src = fs::read_to_string(&path).map_err(|e| LoadError::io(&path, e))?;
            let header = parse_header(&src).map_err(|source| LoadError::Syntax {
                file: path.clone(),
                source,
            })?;

            if let Some(constraint) = &header.constraint {
                if !constraint.eval(&|tag: &str| self.target.has_tag(tag)) {
                    ignored_files.push(name);
                    continue;
                }
            }

            match &package {
                None => package = Some((header.package.clone(), name.clone())),
                Some((first, first_file)) if *first != header.package => {
                    return Err(LoadError::MultiplePackages {
                        dir: dir.to_path_buf(),
                        first: first.clone(),
                        first_file: first_file.clone(),
                        second: header.package,
                        second_file: name,
                    });
                }
                Some(_) => {}
            }

            for import in header.imports {
                if import == CGO_IMPORT {
                    uses_cgo = true;
                } else {
                    imports.insert(import);
                }
            }
            source_files.push(name);
        }

        let Some((name, _)) = package else {
            return Err(LoadError::NoBuildableSource {
                dir: dir.to_path_buf(),
            });
        };

        Ok(PackageDescriptor {
            module_id: module_id.to_string(),
            dir: dir.to_path_buf(),
            name,
            imports: imports.into_iter().collect(),
            source_files,
            ignored_files,
            uses_cgo,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) {
        fs::write(dir.join(name), content).unwrap();
    }

    fn linux_loader() -> PackageLoader {
        PackageLoader::new(BuildTarget::new("linux", "amd64"))
    }

    #[test]
    fn file_name_suffixes() {
        let t = BuildTarget::new("linux", "amd64");
        assert!(t.matches_file_name("file.go"));
        assert!(t.matches_file_name("linux.go"));
        assert!(t.matches_file_name("file_linux.go"));
        assert!(t.matches_file_name("file_amd64.go"));
        assert!(t.matches_file_name("file_linux_amd64.go"));
        assert!(t.matches_file_name("file_unknown.go"));
        assert!(!t.matches_file_name("file_windows.go"));
        assert!(!t.matches_file_name("file_arm64.go"));
        assert!(!t.matches_file_name("file_linux_arm64.go"));
        assert!(!t.matches_file_name("file_darwin_amd64.go"));
    }

    #[test]
    fn implied_tags() {
        let android = BuildTarget::new("android", "arm64");
        assert!(android.has_tag("linux"));
        assert!(android.has_tag("unix"));
        assert!(!BuildTarget::new("windows", "amd64").has_tag("unix"));
        assert!(android.has_tag("go1.21"));
        assert!(!android.has_tag("cgo"));
        assert!(BuildTarget::new("plan9", "386")
            .with_tags(vec!["netgo".to_string()])
            .has_tag("netgo"));
    }

    #[test]
    fn load_collects_sorted_unique_imports() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "b.go", "package lib\nimport (\n\"os\"\n\"fmt\"\n)\n");
        write(tmp.path(), "a.go", "package lib\nimport \"fmt\"\n");

        let pkg = linux_loader().load_dir(tmp.path(), "example.com/lib").unwrap();
        assert_eq!(pkg.module_id, "example.com/lib");
        assert_eq!(pkg.name, "lib");
        assert_eq!(pkg.imports, vec!["fmt", "os"]);
        assert_eq!(pkg.source_files, vec!["a.go", "b.go"]);
        assert!(pkg.ignored_files.is_empty());
    }

    #[test]
    fn load_excludes_tests_and_other_targets() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "lib.go", "package lib\n");
        write(tmp.path(), "lib_test.go", "package lib\nimport \"testing\"\n");
        write(tmp.path(), "lib_windows.go", "package lib\nimport \"syscall\"\n");
        write(
            tmp.path(),
            "tagged.go",
            "//go:build darwin\n\npackage lib\nimport \"unsafe\"\n",
        );
        write(tmp.path(), "_skip.go", "package other\n");
        write(tmp.path(), "notes.txt", "not source");

        let pkg = linux_loader().load_dir(tmp.path(), "lib").unwrap();
        assert_eq!(pkg.source_files, vec!["lib.go"]);
        assert_eq!(
            pkg.ignored_files,
            vec!["lib_test.go", "lib_windows.go", "tagged.go"]
        );
        assert!(pkg.imports.is_empty());
    }

    #[test]
    fn load_records_cgo_without_importing_it() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "c.go", "package lib\nimport \"C\"\nimport \"fmt\"\n");

        let pkg = linux_loader().load_dir(tmp.path(), "lib").unwrap();
        assert!(pkg.uses_cgo);
        assert_eq!(pkg.imports, vec!["fmt"]);
    }

    #[test]
    fn load_empty_directory_has_no_source() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("sub")).unwrap();
        let err = linux_loader().load_dir(tmp.path(), "x").unwrap_err();
        assert!(err.is_no_source());
    }

    #[test]
    fn load_all_files_excluded_has_no_source() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "only_windows.go", "package lib\n");
        let err = linux_loader().load_dir(tmp.path(), "x").unwrap_err();
        assert!(err.is_no_source());
    }

    #[test]
    fn load_rejects_mixed_packages() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "a.go", "package one\n");
        write(tmp.path(), "b.go", "package two\n");
        let err = linux_loader().load_dir(tmp.path(), "x").unwrap_err();
        match err {
            LoadError::MultiplePackages {
                first,
                second,
                second_file,
                ..
            } => {
                assert_eq!(first, "one");
                assert_eq!(second, "two");
                assert_eq!(second_file, "b.go");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn load_reports_syntax_errors() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "a.go", "func main() {}\n");
        let err = linux_loader().load_dir(tmp.path(), "x").unwrap_err();
        assert!(matches!(err, LoadError::Syntax { .. }));
    }

    #[test]
    fn load_missing_directory_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let err = linux_loader()
            .load_dir(&tmp.path().join("absent"), "x")
            .unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }
}
