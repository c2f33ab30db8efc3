//! Discovery of the packages in a project tree.

use crate::loader::PackageLoader;
use crate::package::{derive_module_id, is_ignored_entry, PackageDescriptor};
use crate::report::Reporter;
use crate::resolve::ResolveError;
use std::fs;
use std::io;
use std::path::Path;

/// Walks a project directory and loads every package in it.
#[derive(Debug, Clone, Default)]
pub struct Scanner {
    loader: PackageLoader,
    reporter: Reporter,
}

impl Scanner {
    /// Create a scanner that loads packages with `loader`.
    #[must_use]
    pub fn new(loader: PackageLoader) -> Self {
        Self {
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

    /// Scan `dir`, naming its package `prefix` and each subdirectory's
    /// package after its path below `dir`.
    ///
    /// Subdirectory packages come before the directory's own package.
    /// Directories named `testdata` or `vendor`, or starting with `.` or `_`,
    /// are not entered. A directory without buildable source contributes
    /// nothing.
    ///
    /// # Errors
    ///
    /// Fails on the first unreadable directory or malformed package.
    pub fn scan(&self, prefix: &str, dir: &Path) -> Result<Vec<PackageDescriptor>, ResolveError> {
        let mut packages = Vec::new();
        self.scan_into(prefix, dir, &mut packages)?;
        Ok(packages)
    }

    fn scan_into(
        &self,
        module_id: &str,
        dir: &Path,
        packages: &mut Vec<PackageDescriptor>,
    ) -> Result<(), ResolveError> {
        let mut subdirs = Vec::new();
        for entry in fs::read_dir(dir).map_err(|e| ResolveError::io(dir, e))? {
            let entry = entry.map_err(|e| ResolveError::io(dir, e))?;
            // Symlinked directories are not followed.
            let file_type = entry.file_type().map_err(|e| ResolveError::io(&entry.path(), e))?;
            if !file_type.is_dir() {
                continue;
            }
            let name = entry.file_name().into_string().map_err(|name| {
                let message = format!("directory name {name:?} is not valid UTF-8");
                ResolveError::io(&entry.path(), io::Error::new(io::ErrorKind::InvalidData, message))
            })?;
            if !is_ignored_entry(&name) {
                subdirs.push(name);
            }
        }
        subdirs.sort();

        for name in subdirs {
            let child_id = derive_module_id(module_id, Path::new(&name));
            self.scan_into(&child_id, &dir.join(&name), packages)?;
        }

        match self.loader.load_dir(dir, module_id) {
            Ok(package) => {
                self.reporter
                    .report(format_args!("loaded {} ({})", package.module_id, package.name));
                packages.push(package);
                Ok(())
            }
            Err(e) if e.is_no_source() => Ok(()),
            Err(source) => Err(ResolveError::MalformedSource {
                module_id: module_id.to_string(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::BuildTarget;
    use tempfile::TempDir;

    fn package(root: &Path, rel: &str, name: &str) {
        let dir = root.join(rel);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("main.go"), format!("package {name}\n")).unwrap();
    }

    fn scanner() -> Scanner {
        Scanner::new(PackageLoader::new(BuildTarget::new("linux", "amd64")))
    }

    fn ids(packages: &[PackageDescriptor]) -> Vec<&str> {
        packages.iter().map(|p| p.module_id.as_str()).collect()
    }

    #[test]
    fn children_before_parent() {
        let tmp = TempDir::new().unwrap();
        package(tmp.path(), "a", "a");
        package(tmp.path(), "a/b", "b");

        let found = scanner().scan("prefix", tmp.path()).unwrap();
        assert_eq!(ids(&found), vec!["prefix/a/b", "prefix/a"]);
    }

    #[test]
    fn root_package_comes_last() {
        let tmp = TempDir::new().unwrap();
        package(tmp.path(), "", "main");
        package(tmp.path(), "lib", "lib");
        package(tmp.path(), "cmd/tool", "main");

        let found = scanner().scan("example.com/app", tmp.path()).unwrap();
        assert_eq!(
            ids(&found),
            vec!["example.com/app/cmd/tool", "example.com/app/lib", "example.com/app"]
        );
    }

    #[test]
    fn reserved_and_hidden_directories_are_skipped() {
        let tmp = TempDir::new().unwrap();
        package(tmp.path(), "kept", "kept");
        package(tmp.path(), ".git", "git");
        package(tmp.path(), "_ignored", "ignored");
        package(tmp.path(), "testdata", "fixture");
        package(tmp.path(), "vendor/example.com/dep", "dep");
        package(tmp.path(), "kept/testdata/deep", "deep");

        let found = scanner().scan("p", tmp.path()).unwrap();
        assert_eq!(ids(&found), vec!["p/kept"]);
    }

    #[test]
    fn intermediate_directories_without_source_are_not_errors() {
        let tmp = TempDir::new().unwrap();
        package(tmp.path(), "x/y/z", "z");
        fs::write(tmp.path().join("x").join("README.md"), "docs").unwrap();

        let found = scanner().scan("p", tmp.path()).unwrap();
        assert_eq!(ids(&found), vec!["p/x/y/z"]);
    }

    #[test]
    fn malformed_package_aborts_scan() {
        let tmp = TempDir::new().unwrap();
        package(tmp.path(), "good", "good");
        let bad = tmp.path().join("bad");
        fs::create_dir_all(&bad).unwrap();
        fs::write(bad.join("a.go"), "package one\n").unwrap();
        fs::write(bad.join("b.go"), "package two\n").unwrap();

        let err = scanner().scan("p", tmp.path()).unwrap_err();
        match err {
            ResolveError::MalformedSource { module_id, .. } => assert_eq!(module_id, "p/bad"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unreadable_root_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let err = scanner()
            .scan("p", &tmp.path().join("missing"))
            .unwrap_err();
        assert!(matches!(err, ResolveError::Io { .. }));
    }

    #[test]
    fn module_id_ignores_declared_name() {
        let tmp = TempDir::new().unwrap();
        package(tmp.path(), "server", "httpserver");

        let found = scanner().scan("example.com/app", tmp.path()).unwrap();
        assert_eq!(found[0].module_id, "example.com/app/server");
        assert_eq!(found[0].name, "httpserver");
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_directories_are_not_followed() {
        let tmp = TempDir::new().unwrap();
        let project = tmp.path().join("project");
        package(&project, "real", "real");
        package(tmp.path(), "elsewhere/linked", "linked");
        std::os::unix::fs::symlink(tmp.path().join("elsewhere"), project.join("alias")).unwrap();
        std::os::unix::fs::symlink(project.join("real"), project.join("again")).unwrap();

        let found = scanner().scan("p", &project).unwrap();
        assert_eq!(ids(&found), vec!["p/real"]);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn non_utf8_directory_name_is_an_error() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let tmp = TempDir::new().unwrap();
        package(tmp.path(), "ok", "ok");
        let bad = tmp.path().join(OsStr::from_bytes(b"bad\xff"));
        fs::create_dir_all(&bad).unwrap();
        fs::write(bad.join("bad.go"), "package bad\n").unwrap();

        let err = scanner().scan("p", tmp.path()).unwrap_err();
        match err {
            ResolveError::Io { path, source } => {
                assert_eq!(path, bad);
                assert_eq!(source.kind(), io::ErrorKind::InvalidData);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
