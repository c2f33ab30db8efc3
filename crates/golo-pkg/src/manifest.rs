//! Project configuration (`golo.toml`) parsing and validation.

use crate::loader::BuildTarget;
use crate::package::is_valid_module_id;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// The configuration file name.
pub const MANIFEST_FILE: &str = "golo.toml";

/// Standard library root used when nothing else names one.
pub const DEFAULT_STD_ROOT: &str = "/usr/local/go/src";

/// Errors that can occur when working with `golo.toml`.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {MANIFEST_FILE}: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid prefix '{0}': {1}")]
    InvalidPrefix(String, &'static str),

    #[error("pin for '{0}' is missing a {1}")]
    IncompletePin(String, &'static str),

    #[error("prefix '{0}' is pinned more than once")]
    DuplicatePin(String),
}

/// The complete `golo.toml` file. Every section is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub package: PackageSection,

    #[serde(default)]
    pub build: BuildSection,

    /// Prefixes served from cache snapshots.
    #[serde(default, rename = "pin", skip_serializing_if = "Vec::is_empty")]
    pub pins: Vec<Pin>,

    #[serde(default)]
    pub toolchain: Option<ToolchainSection>,
}

/// `[package]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageSection {
    /// Module identifier prefix of the project's own packages.
    #[serde(default)]
    pub prefix: Option<String>,
}

/// `[build]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildSection {
    #[serde(default)]
    pub os: Option<String>,

    #[serde(default)]
    pub arch: Option<String>,

    /// Extra build tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(default, rename = "std-root")]
    pub std_root: Option<PathBuf>,
}

/// A `[[pin]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Pin {
    pub prefix: String,
    pub kind: String,
    pub arg: String,
}

/// `[toolchain]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolchainSection {
    /// Program run with the build plan path as its last argument.
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,
}

impl Manifest {
    /// Load `golo.toml` from `project_root`, or the empty configuration if
    /// there is none.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or is invalid.
    pub fn load_optional(project_root: &Path) -> Result<Self, ConfigError> {
        let path = project_root.join(MANIFEST_FILE);
        if !path.is_file() {
            return Ok(Self::default());
        }
        Self::from_path(&path)
    }

    /// Load a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or fails validation.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let manifest: Self = toml::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(prefix) = &self.package.prefix {
            validate_prefix(prefix)?;
        }

        let mut pinned = HashSet::new();
        for pin in &self.pins {
            validate_prefix(&pin.prefix)?;
            if pin.kind.is_empty() {
                return Err(ConfigError::IncompletePin(pin.prefix.clone(), "kind"));
            }
            if pin.arg.is_empty() {
                return Err(ConfigError::IncompletePin(pin.prefix.clone(), "arg"));
            }
            if !pinned.insert(pin.prefix.as_str()) {
                return Err(ConfigError::DuplicatePin(pin.prefix.clone()));
            }
        }
        Ok(())
    }

    /// Apply the `[build]` section over `base`.
    #[must_use]
    pub fn target(&self, base: BuildTarget) -> BuildTarget {
        let mut target = base;
        if let Some(os) = &self.build.os {
            target.os.clone_from(os);
        }
        if let Some(arch) = &self.build.arch {
            target.arch.clone_from(arch);
        }
        target.with_tags(self.build.tags.iter().cloned())
    }

    /// Serialize to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// Check that `prefix` can scope module identifiers and name a directory
/// below a cache snapshot.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidPrefix`] with the reason it was rejected.
pub fn validate_prefix(prefix: &str) -> Result<(), ConfigError> {
    let reason = if prefix.is_empty() {
        "prefix cannot be empty"
    } else if prefix.starts_with('/') || prefix.ends_with('/') {
        "prefix cannot start or end with '/'"
    } else if prefix.contains("//") {
        "prefix cannot contain empty path elements"
    } else if prefix.chars().any(|c| c.is_whitespace() || c == '\\') {
        "prefix cannot contain whitespace or backslashes"
    } else if !is_valid_module_id(prefix) {
        "prefix elements cannot be '.' or '..' or contain ':'"
    } else {
        return Ok(());
    };
    Err(ConfigError::InvalidPrefix(prefix.to_string(), reason))
}

/// Standard library root named by the environment.
///
/// `GOLO_STDROOT` wins over `GOROOT`, whose `src` directory is used.
/// Empty values are treated as unset.
pub fn std_root_from_env(var: impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
    let set = |name: &str| var(name).filter(|v| !v.is_empty());
    set("GOLO_STDROOT")
        .map(PathBuf::from)
        .or_else(|| set("GOROOT").map(|root| Path::new(&root).join("src")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn parse_empty_manifest() {
        let manifest = Manifest::parse("").unwrap();
        assert_eq!(manifest, Manifest::default());
    }

    #[test]
    fn parse_full_manifest() {
        let content = r#"
[package]
prefix = "example.com/me/project"

[build]
os = "linux"
arch = "arm64"
tags = ["netgo"]
std-root = "/opt/go/src"

[[pin]]
prefix = "example.com/foo"
kind = "rev"
arg = "v1.2.0"

[[pin]]
prefix = "example.com/bar"
kind = "version"
arg = "3"

[toolchain]
command = "my-compiler"
args = ["--fast"]
"#;
        let manifest = Manifest::parse(content).unwrap();
        assert_eq!(manifest.package.prefix.as_deref(), Some("example.com/me/project"));
        assert_eq!(manifest.build.os.as_deref(), Some("linux"));
        assert_eq!(manifest.build.std_root, Some(PathBuf::from("/opt/go/src")));
        assert_eq!(manifest.pins.len(), 2);
        assert_eq!(manifest.pins[0].arg, "v1.2.0");
        let toolchain = manifest.toolchain.unwrap();
        assert_eq!(toolchain.command, "my-compiler");
        assert_eq!(toolchain.args, vec!["--fast"]);
    }

    #[test]
    fn unknown_field_rejected() {
        let err = Manifest::parse("[package]\nname = \"x\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn invalid_prefix() {
        let err = Manifest::parse("[package]\nprefix = \"/abs\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPrefix(..)));
    }

    #[test]
    fn prefix_with_dot_elements_is_invalid() {
        for prefix in ["example.com/..", "../up", "a/./b", "c:/x"] {
            assert!(
                matches!(validate_prefix(prefix), Err(ConfigError::InvalidPrefix(ref p, _)) if p == prefix),
                "{prefix}"
            );
        }
        assert!(validate_prefix("example.com/foo.v2").is_ok());

        let err = Manifest::parse("[[pin]]\nprefix = \"x/../..\"\nkind = \"rev\"\narg = \"1\"\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPrefix(..)));
    }

    #[test]
    fn duplicate_pin() {
        let content = r#"
[[pin]]
prefix = "a.com/x"
kind = "rev"
arg = "1"

[[pin]]
prefix = "a.com/x"
kind = "rev"
arg = "2"
"#;
        let err = Manifest::parse(content).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicatePin(ref p) if p == "a.com/x"));
    }

    #[test]
    fn pin_needs_arg() {
        let content = "[[pin]]\nprefix = \"a.com/x\"\nkind = \"rev\"\narg = \"\"\n";
        let err = Manifest::parse(content).unwrap_err();
        assert!(matches!(err, ConfigError::IncompletePin(_, "arg")));
    }

    #[test]
    fn missing_file_is_empty_config() {
        let tmp = TempDir::new().unwrap();
        let manifest = Manifest::load_optional(tmp.path()).unwrap();
        assert_eq!(manifest, Manifest::default());
    }

    #[test]
    fn load_from_project_root() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join(MANIFEST_FILE),
            "[package]\nprefix = \"example.com/app\"\n",
        )
        .unwrap();
        let manifest = Manifest::load_optional(tmp.path()).unwrap();
        assert_eq!(manifest.package.prefix.as_deref(), Some("example.com/app"));
    }

    #[test]
    fn build_section_overrides_target() {
        let manifest = Manifest::parse("[build]\nos = \"windows\"\ntags = [\"purego\"]\n").unwrap();
        let target = manifest.target(BuildTarget::new("linux", "amd64"));
        assert_eq!(target.os, "windows");
        assert_eq!(target.arch, "amd64");
        assert!(target.has_tag("purego"));
    }

    #[test]
    fn env_std_root_precedence() {
        let env = |pairs: &'static [(&'static str, &'static str)]| {
            move |name: &str| {
                pairs
                    .iter()
                    .find(|(k, _)| *k == name)
                    .map(|(_, v)| (*v).to_string())
            }
        };

        assert_eq!(
            std_root_from_env(env(&[("GOLO_STDROOT", "/a"), ("GOROOT", "/b")])),
            Some(PathBuf::from("/a"))
        );
        assert_eq!(
            std_root_from_env(env(&[("GOROOT", "/b")])),
            Some(Path::new("/b").join("src"))
        );
        assert_eq!(
            std_root_from_env(env(&[("GOLO_STDROOT", ""), ("GOROOT", "/b")])),
            Some(Path::new("/b").join("src"))
        );
        assert_eq!(std_root_from_env(env(&[])), None);
    }

    #[test]
    fn roundtrip_to_toml() {
        let manifest = Manifest {
            package: PackageSection {
                prefix: Some("example.com/app".to_string()),
            },
            ..Manifest::default()
        };
        let content = manifest.to_toml_string().unwrap();
        assert_eq!(Manifest::parse(&content).unwrap(), manifest);
    }
}
