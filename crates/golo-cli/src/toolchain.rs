//! Handing a build plan to an external compiler.

use golo_pkg::{
    BuildContext, BuildError, BuildOutcome, BuildPackage, BuildPlan, Reporter, Toolchain,
    ToolchainSection,
};
use std::fs;
use std::process::Command;

/// Writes `plan.json` into the work directory and, when a compiler command
/// is configured, runs it with the plan path as its last argument.
#[derive(Debug, Clone, Default)]
pub struct PlanToolchain {
    command: Option<ToolchainSection>,
    reporter: Reporter,
}

impl PlanToolchain {
    pub fn new(command: Option<ToolchainSection>) -> Self {
        Self {
            command,
            reporter: Reporter::quiet(),
        }
    }

    /// Enable verbose output.
    #[must_use]
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.reporter = Reporter::new(verbose);
        self
    }
}

impl Toolchain for PlanToolchain {
    fn build(
        &self,
        ctx: &BuildContext,
        packages: &[BuildPackage],
    ) -> Result<BuildOutcome, BuildError> {
        fs::create_dir_all(&ctx.workdir).map_err(|source| BuildError::Io {
            path: ctx.workdir.clone(),
            source,
        })?;
        let plan = BuildPlan::new(ctx, packages).write(&ctx.workdir)?;
        self.reporter
            .report(format_args!("wrote {}", plan.display()));

        let executables = packages
            .iter()
            .filter_map(|p| p.executable.clone())
            .collect();

        let Some(toolchain) = &self.command else {
            return Ok(BuildOutcome {
                plan,
                invoked: false,
                executables,
            });
        };

        for package in packages {
            if let Some(parent) = package.archive.parent() {
                fs::create_dir_all(parent).map_err(|source| BuildError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        self.reporter.report(format_args!(
            "running {} {}",
            toolchain.command,
            toolchain.args.join(" ")
        ));
        let status = Command::new(&toolchain.command)
            .args(&toolchain.args)
            .arg(&plan)
            .current_dir(&ctx.workdir)
            .status()
            .map_err(|e| BuildError::Toolchain {
                command: toolchain.command.clone(),
                message: format!("failed to start: {e}"),
            })?;

        if !status.success() {
            return Err(BuildError::Toolchain {
                command: toolchain.command.clone(),
                message: format!("exited with {status}"),
            });
        }

        Ok(BuildOutcome {
            plan,
            invoked: true,
            executables,
        })
    }
}
