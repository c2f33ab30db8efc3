//! Turning a resolved package set into an ordered build plan.

use crate::loader::BuildTarget;
use crate::package::{module_dir, PackageDescriptor, PKG_DIR, TOOL_DIR};
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name the build plan is written to inside the work directory.
pub const PLAN_FILE: &str = "plan.json";

/// Errors that can occur while planning or running a build.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("import cycle: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    #[error("package {package} imports {import}, which is not in the package set")]
    MissingDependency { package: String, import: String },

    #[error("package {0} appears more than once")]
    DuplicatePackage(String),

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode build plan: {0}")]
    Plan(#[from] serde_json::Error),

    #[error("toolchain `{command}` failed: {message}")]
    Toolchain { command: String, message: String },
}

/// Where build products go, and for which target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildContext {
    pub target: BuildTarget,
    /// Scratch directory for intermediate files.
    pub workdir: PathBuf,
    /// Root of the compiled package archives.
    pub pkgdir: PathBuf,
    /// Directory executables are written to.
    pub bindir: PathBuf,
}

/// One package with its build outputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildPackage {
    pub module_id: String,
    pub name: String,
    pub dir: PathBuf,
    pub source_files: Vec<PathBuf>,
    pub imports: Vec<String>,
    pub uses_cgo: bool,
    /// Compiled archive path.
    pub archive: PathBuf,
    /// Linked executable path, for command packages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executable: Option<PathBuf>,
}

/// What a toolchain produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutcome {
    /// Where the plan was written.
    pub plan: PathBuf,
    /// Whether a compiler was actually run.
    pub invoked: bool,
    pub executables: Vec<PathBuf>,
}

/// Builds an ordered package list.
pub trait Toolchain {
    /// Build `packages`, which are ordered dependencies first.
    fn build(
        &self,
        ctx: &BuildContext,
        packages: &[BuildPackage],
    ) -> Result<BuildOutcome, BuildError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Active,
    Done,
}

impl BuildContext {
    /// Context for a project: archives under `.golo/pkg`, executables in the
    /// project root.
    #[must_use]
    pub fn for_project(project_root: &Path, target: BuildTarget, workdir: PathBuf) -> Self {
        Self {
            target,
            workdir,
            pkgdir: project_root.join(TOOL_DIR).join(PKG_DIR),
            bindir: project_root.to_path_buf(),
        }
    }

    /// Archive path of a module: `pkgdir/<os>_<arch>/<module_id>.a`.
    #[must_use]
    pub fn archive_path(&self, module_id: &str) -> PathBuf {
        module_dir(
            &self.pkgdir.join(self.target.to_string()),
            &format!("{module_id}.a"),
        )
    }

    /// Executable path of a command package.
    #[must_use]
    pub fn executable_path(&self, package: &PackageDescriptor) -> PathBuf {
        let mut name = package.base_name().to_string();
        if self.target.os == "windows" {
            name.push_str(".exe");
        }
        self.bindir.join(name)
    }

    /// Order `packages` so that each comes after everything it imports, and
    /// attach output paths.
    ///
    /// Packages with no ordering constraint between them keep their input
    /// order.
    ///
    /// # Errors
    ///
    /// Fails if an import is not in `packages`, a module identifier appears
    /// twice, or the imports form a cycle.
    pub fn transform(
        &self,
        packages: &[PackageDescriptor],
    ) -> Result<Vec<BuildPackage>, BuildError> {
        let mut index = HashMap::with_capacity(packages.len());
        for (i, package) in packages.iter().enumerate() {
            if index.insert(package.module_id.as_str(), i).is_some() {
                return Err(BuildError::DuplicatePackage(package.module_id.clone()));
            }
        }
        for package in packages {
            if let Some(import) = package.imports.iter().find(|i| !index.contains_key(i.as_str())) {
                return Err(BuildError::MissingDependency {
                    package: package.module_id.clone(),
                    import: import.clone(),
                });
            }
        }

        let mut marks = vec![Mark::Unvisited; packages.len()];
        let mut path = Vec::new();
        let mut order = Vec::with_capacity(packages.len());
        for i in 0..packages.len() {
            visit(i, packages, &index, &mut marks, &mut path, &mut order)?;
        }

        Ok(order
            .into_iter()
            .map(|i| self.build_package(&packages[i]))
            .collect())
    }

    fn build_package(&self, package: &PackageDescriptor) -> BuildPackage {
        BuildPackage {
            module_id: package.module_id.clone(),
            name: package.name.clone(),
            dir: package.dir.clone(),
            source_files: package.source_paths().collect(),
            imports: package.imports.clone(),
            uses_cgo: package.uses_cgo,
            archive: self.archive_path(&package.module_id),
            executable: package.is_command().then(|| self.executable_path(package)),
        }
    }
}

fn visit(
    i: usize,
    packages: &[PackageDescriptor],
    index: &HashMap<&str, usize>,
    marks: &mut [Mark],
    path: &mut Vec<usize>,
    order: &mut Vec<usize>,
) -> Result<(), BuildError> {
    match marks[i] {
        Mark::Done => return Ok(()),
        Mark::Active => {
            let start = path.iter().position(|&p| p == i).unwrap_or(0);
            let mut cycle: Vec<String> = path[start..]
                .iter()
                .map(|&p| packages[p].module_id.clone())
                .collect();
            cycle.push(packages[i].module_id.clone());
            return Err(BuildError::Cycle(cycle));
        }
        Mark::Unvisited => {}
    }

    marks[i] = Mark::Active;
    path.push(i);
    for import in &packages[i].imports {
        if let Some(&dep) = index.get(import.as_str()) {
            visit(dep, packages, index, marks, path, order)?;
        }
    }
    path.pop();
    marks[i] = Mark::Done;
    order.push(i);
    Ok(())
}

/// The serialized form handed to a compiler.
#[derive(Debug, Serialize)]
pub struct BuildPlan<'a> {
    pub os: &'a str,
    pub arch: &'a str,
    pub tags: &'a [String],
    pub workdir: &'a Path,
    pub packages: &'a [BuildPackage],
}

impl<'a> BuildPlan<'a> {
    #[must_use]
    pub fn new(ctx: &'a BuildContext, packages: &'a [BuildPackage]) -> Self {
        Self {
            os: &ctx.target.os,
            arch: &ctx.target.arch,
            tags: &ctx.target.tags,
            workdir: &ctx.workdir,
            packages,
        }
    }

    /// Write the plan as JSON into `dir`, returning the file path.
    pub fn write(&self, dir: &Path) -> Result<PathBuf, BuildError> {
        let path = dir.join(PLAN_FILE);
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json).map_err(|source| BuildError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}
