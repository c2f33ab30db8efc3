//! Repository detection and package prefix guessing.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// A git working tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    root: PathBuf,
}

impl Repository {
    /// Repository rooted at `root`.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Find the nearest directory at or above `start` that contains `.git`.
    pub fn detect(start: &Path) -> Result<Self> {
        start
            .ancestors()
            .find(|dir| dir.join(".git").exists())
            .map(Self::at)
            .with_context(|| {
                format!("No git repository found at or above {}", start.display())
            })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// URL of the named remote.
    ///
    /// Asks git first and falls back to reading `.git/config` directly when
    /// git is unavailable.
    pub fn remote(&self, name: &str) -> Result<String> {
        let key = format!("remote.{name}.url");
        if let Ok(url) = run_git(&["config", "--get", &key], &self.root) {
            if !url.is_empty() {
                return Ok(url);
            }
        }

        let config = self.root.join(".git").join("config");
        let content = fs::read_to_string(&config)
            .with_context(|| format!("Failed to read {}", config.display()))?;
        config_remote_url(&content, name)
            .with_context(|| format!("Repository has no remote named '{name}'"))
    }
}

fn run_git(args: &[&str], cwd: &Path) -> Result<String> {
    let out = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .output()
        .context("Failed to execute git")?;
    if !out.status.success() {
        let stderr = String::from_utf8_lossy(&out.stderr);
        bail!("git {:?} failed: {}", args, stderr.trim());
    }
    Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
}

/// `url` of `[remote "<name>"]` in a git config file.
fn config_remote_url(content: &str, name: &str) -> Option<String> {
    let header = format!("[remote \"{name}\"]");
    let mut in_section = false;
    for line in content.lines() {
        let line = line.trim();
        if line.starts_with('[') {
            in_section = line == header;
            continue;
        }
        if !in_section {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            if key.trim() == "url" {
                return Some(value.trim().to_string());
            }
        }
    }
    None
}

/// Guess a module identifier prefix from a remote URL.
///
/// `https://host/path`, `ssh://user@host/path` and the scp-like
/// `user@host:path` all give `host/path`, without a trailing `.git` or `/`.
pub fn guess_prefix(remote: &str) -> Result<String> {
    let remote = remote.trim();

    let (host, path) = if let Some((scheme, rest)) = remote.split_once("://") {
        if scheme.is_empty() {
            bail!("Cannot guess package from remote '{remote}': missing scheme");
        }
        let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));
        let host = authority.rsplit('@').next().unwrap_or(authority);
        let host = host.split(':').next().unwrap_or(host);
        (host, path)
    } else if let Some((user_host, path)) = remote.split_once(':') {
        if user_host.contains('/') {
            bail!("Cannot guess package from remote '{remote}'");
        }
        let host = user_host.rsplit('@').next().unwrap_or(user_host);
        (host, path)
    } else {
        bail!("Cannot guess package from remote '{remote}'");
    };

    if host.is_empty() {
        bail!("Cannot guess package from remote '{remote}': missing host");
    }

    let path = path.trim_end_matches('/');
    let path = path.strip_suffix(".git").unwrap_or(path).trim_matches('/');
    if path.is_empty() {
        return Ok(host.to_string());
    }
    Ok(format!("{host}/{path}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_guess_prefix_https() {
        assert_eq!(
            guess_prefix("https://github.com/user/repo.git").unwrap(),
            "github.com/user/repo"
        );
        assert_eq!(
            guess_prefix("https://github.com/user/repo/").unwrap(),
            "github.com/user/repo"
        );
        assert_eq!(
            guess_prefix("https://token@git.example.com:8443/team/repo").unwrap(),
            "git.example.com/team/repo"
        );
    }

    #[test]
    fn test_guess_prefix_ssh() {
        assert_eq!(
            guess_prefix("ssh://git@github.com/user/repo.git").unwrap(),
            "github.com/user/repo"
        );
        assert_eq!(
            guess_prefix("git@github.com:user/repo.git").unwrap(),
            "github.com/user/repo"
        );
        assert_eq!(
            guess_prefix("example.com:group/sub/repo").unwrap(),
            "example.com/group/sub/repo"
        );
    }

    #[test]
    fn test_guess_prefix_rejects_paths() {
        assert!(guess_prefix("/srv/git/repo.git").is_err());
        assert!(guess_prefix("../repo").is_err());
        assert!(guess_prefix("https:///repo").is_err());
    }

    #[test]
    fn test_config_remote_url() {
        let content = r#"
[core]
	bare = false
[remote "upstream"]
	url = https://example.com/upstream.git
[remote "origin"]
	url = git@github.com:me/project.git
	fetch = +refs/heads/*:refs/remotes/origin/*
"#;
        assert_eq!(
            config_remote_url(content, "origin").as_deref(),
            Some("git@github.com:me/project.git")
        );
        assert_eq!(
            config_remote_url(content, "upstream").as_deref(),
            Some("https://example.com/upstream.git")
        );
        assert_eq!(config_remote_url(content, "fork"), None);
    }

    #[test]
    fn test_detect_walks_up() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join(".git")).unwrap();
        let nested = tmp.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();

        let repo = Repository::detect(&nested).unwrap();
        assert_eq!(repo.root(), tmp.path());
    }

    #[test]
    fn test_remote_from_config_file() {
        let tmp = TempDir::new().unwrap();
        let git = tmp.path().join(".git");
        fs::create_dir_all(&git).unwrap();
        fs::write(
            git.join("config"),
            "[remote \"origin\"]\n\turl = https://example.com/me/app.git\n",
        )
        .unwrap();

        let repo = Repository::at(tmp.path());
        assert_eq!(repo.remote("origin").unwrap(), "https://example.com/me/app.git");
    }
}
