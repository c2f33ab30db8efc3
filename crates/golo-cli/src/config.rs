//! Effective settings: command-line flags over `golo.toml` over environment.

use crate::vcs::{guess_prefix, Repository};
use anyhow::{Context, Result};
use clap::Args;
use golo_pkg::{
    std_root_from_env, BuildTarget, Manifest, PinnedCache, Reporter, SourceChain,
    DEFAULT_STD_ROOT, MANIFEST_FILE,
};
use std::path::{Path, PathBuf};

/// Flags accepted by every command.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Module identifier prefix of the project (guessed from the origin
    /// remote by default)
    #[arg(long, global = true)]
    pub package: Option<String>,

    /// Print progress to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Target operating system
    #[arg(long, global = true)]
    pub os: Option<String>,

    /// Target architecture
    #[arg(long, global = true)]
    pub arch: Option<String>,

    /// Standard library source root
    #[arg(long, global = true)]
    pub std_root: Option<PathBuf>,
}

/// Everything a command needs to know about the project.
#[derive(Debug)]
pub struct Settings {
    pub repo: Repository,
    pub manifest: Manifest,
    pub target: BuildTarget,
    pub std_root: PathBuf,
    pub reporter: Reporter,
    package: Option<String>,
}

impl Settings {
    /// Detect the repository containing `cwd` and load its configuration.
    pub fn load(cwd: &Path, args: &GlobalArgs) -> Result<Self> {
        let repo = Repository::detect(cwd)?;
        let manifest = Manifest::load_optional(repo.root())
            .with_context(|| format!("Failed to load {MANIFEST_FILE}"))?;
        let settings = Self::new(repo, manifest, args, |name| std::env::var(name).ok());
        settings
            .reporter
            .report(format_args!("repository root: {}", settings.root().display()));
        Ok(settings)
    }

    fn new(
        repo: Repository,
        manifest: Manifest,
        args: &GlobalArgs,
        env: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let mut target = manifest.target(BuildTarget::host());
        if let Some(os) = &args.os {
            target.os.clone_from(os);
        }
        if let Some(arch) = &args.arch {
            target.arch.clone_from(arch);
        }

        let std_root = args
            .std_root
            .clone()
            .or_else(|| manifest.build.std_root.clone())
            .or_else(|| std_root_from_env(env))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STD_ROOT));

        let package = args
            .package
            .clone()
            .or_else(|| manifest.package.prefix.clone());

        Self {
            repo,
            manifest,
            target,
            std_root,
            reporter: Reporter::new(args.verbose),
            package,
        }
    }

    pub fn root(&self) -> &Path {
        self.repo.root()
    }

    pub fn verbose(&self) -> bool {
        self.reporter.is_verbose()
    }

    /// Module identifier prefix of the project's own packages.
    pub fn prefix(&self) -> Result<String> {
        if let Some(prefix) = &self.package {
            self.reporter
                .report(format_args!("using provided package {prefix}"));
            return Ok(prefix.clone());
        }
        let remote = self
            .repo
            .remote("origin")
            .context("Cannot guess the package; pass --package or set [package] prefix")?;
        let prefix = guess_prefix(&remote)?;
        self.reporter
            .report(format_args!("using guessed package {prefix}"));
        Ok(prefix)
    }

    /// Package sources: pinned prefixes in configuration order, then the
    /// standard library, then `vendor`.
    pub fn source_chain(&self) -> SourceChain {
        let mut chain = SourceChain::standard(self.root(), &self.std_root);
        for pin in self.manifest.pins.iter().rev() {
            let cache = PinnedCache::register(self.root(), &pin.prefix, &pin.kind, &pin.arg);
            self.reporter
                .report(format_args!("registered: {}", cache.key()));
            chain = chain.with_first(cache);
        }
        chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::new(
            Repository::at("/project"),
            Manifest::default(),
            &GlobalArgs::default(),
            no_env,
        );
        assert_eq!(settings.target, BuildTarget::host());
        assert_eq!(settings.std_root, PathBuf::from(DEFAULT_STD_ROOT));
        assert!(!settings.verbose());
    }

    #[test]
    fn test_flags_override_manifest() {
        let manifest = Manifest::parse(
            "[package]\nprefix = \"example.com/from-file\"\n\n[build]\nos = \"freebsd\"\narch = \"arm64\"\nstd-root = \"/file/src\"\n",
        )
        .unwrap();
        let args = GlobalArgs {
            package: Some("example.com/from-flag".to_string()),
            os: Some("windows".to_string()),
            std_root: Some(PathBuf::from("/flag/src")),
            ..GlobalArgs::default()
        };

        let settings = Settings::new(Repository::at("/project"), manifest, &args, no_env);
        assert_eq!(settings.target.os, "windows");
        assert_eq!(settings.target.arch, "arm64");
        assert_eq!(settings.std_root, PathBuf::from("/flag/src"));
        assert_eq!(settings.prefix().unwrap(), "example.com/from-flag");
    }

    #[test]
    fn test_manifest_overrides_environment() {
        let manifest = Manifest::parse("[build]\nstd-root = \"/file/src\"\n").unwrap();
        let env = |name: &str| (name == "GOLO_STDROOT").then(|| "/env/src".to_string());

        let settings = Settings::new(
            Repository::at("/project"),
            manifest,
            &GlobalArgs::default(),
            env,
        );
        assert_eq!(settings.std_root, PathBuf::from("/file/src"));
    }

    #[test]
    fn test_environment_overrides_default() {
        let env = |name: &str| (name == "GOROOT").then(|| "/opt/go".to_string());
        let settings = Settings::new(
            Repository::at("/project"),
            Manifest::default(),
            &GlobalArgs::default(),
            env,
        );
        assert_eq!(settings.std_root, Path::new("/opt/go").join("src"));
    }

    #[test]
    fn test_manifest_prefix_used() {
        let manifest = Manifest::parse("[package]\nprefix = \"example.com/app\"\n").unwrap();
        let settings = Settings::new(
            Repository::at("/project"),
            manifest,
            &GlobalArgs::default(),
            no_env,
        );
        assert_eq!(settings.prefix().unwrap(), "example.com/app");
    }

    #[test]
    fn test_pins_come_first_in_order() {
        let manifest = Manifest::parse(
            "[[pin]]\nprefix = \"a.com/x\"\nkind = \"rev\"\narg = \"1\"\n\n[[pin]]\nprefix = \"b.com/y\"\nkind = \"rev\"\narg = \"2\"\n",
        )
        .unwrap();
        let settings = Settings::new(
            Repository::at("/project"),
            manifest,
            &GlobalArgs::default(),
            no_env,
        );

        let chain = settings.source_chain();
        let described: Vec<String> = chain.iter().map(|s| s.describe()).collect();
        assert_eq!(chain.len(), 4);
        assert!(described[0].contains("a.com/x"));
        assert!(described[1].contains("b.com/y"));
        assert!(described[2].starts_with("standard library"));
        assert!(described[3].starts_with("vendor"));
    }
}
