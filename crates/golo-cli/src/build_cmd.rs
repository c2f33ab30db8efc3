//! `golo build` and `golo list`.

use crate::config::Settings;
use crate::toolchain::PlanToolchain;
use anyhow::{bail, Context, Result};
use golo_pkg::{
    BuildContext, PackageDescriptor, PackageLoader, PackageSource, Resolver, Scanner, Toolchain,
    PLAN_FILE, TOOL_DIR,
};
use std::fs;

/// Scan the project and resolve everything it imports.
pub fn load_packages(settings: &Settings) -> Result<Vec<PackageDescriptor>> {
    let prefix = settings.prefix()?;
    let loader = PackageLoader::new(settings.target.clone());
    let reporter = settings.reporter;

    reporter.report("load local sources");
    let local = Scanner::new(loader.clone())
        .verbose(settings.verbose())
        .scan(&prefix, settings.root())
        .context("Failed to load local sources")?;
    if local.is_empty() {
        bail!(
            "No buildable packages found in {}",
            settings.root().display()
        );
    }

    reporter.report("load dependencies");
    let resolver = Resolver::new(settings.source_chain(), loader).verbose(settings.verbose());
    for source in resolver.chain().iter() {
        reporter.report(format_args!("  search {}", source.describe()));
    }
    resolver
        .resolve(local)
        .context("Failed to resolve dependencies")
}

/// Build every package in the project.
pub fn build(settings: &Settings) -> Result<()> {
    let packages = load_packages(settings)?;

    let workdir = tempfile::Builder::new()
        .prefix("golo")
        .tempdir()
        .context("Failed to create work directory")?;
    let ctx = BuildContext::for_project(
        settings.root(),
        settings.target.clone(),
        workdir.path().to_path_buf(),
    );

    let plan = ctx.transform(&packages)?;
    for package in &plan {
        settings
            .reporter
            .report(format_args!("package: {}", package.module_id));
    }

    let toolchain =
        PlanToolchain::new(settings.manifest.toolchain.clone()).verbose(settings.verbose());
    let outcome = toolchain.build(&ctx, &plan)?;

    if outcome.invoked {
        for exe in &outcome.executables {
            println!("built {}", exe.display());
        }
        return Ok(());
    }

    // The work directory goes away on return; keep the plan next to the cache.
    let kept = settings.root().join(TOOL_DIR).join(PLAN_FILE);
    if let Some(parent) = kept.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::copy(&outcome.plan, &kept)
        .with_context(|| format!("Failed to write {}", kept.display()))?;
    println!(
        "No toolchain configured; build plan for {} packages written to {}",
        plan.len(),
        kept.display()
    );
    Ok(())
}

/// Print the resolved package set.
pub fn list(settings: &Settings, json: bool) -> Result<()> {
    let packages = load_packages(settings)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&packages)?);
        return Ok(());
    }

    for package in &packages {
        if package.name == package.base_name() {
            println!("{}", package.module_id);
        } else {
            println!("{} ({})", package.module_id, package.name);
        }
    }
    Ok(())
}
