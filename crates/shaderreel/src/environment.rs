use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use directories_next::BaseDirs;

pub const ENV_HOME: &str = "SHADERREEL_HOME";
const DEFAULT_DIR_NAME: &str = ".shaderreel";

/// Every path the process touches, resolved once at startup and passed down.
#[derive(Debug, Clone)]
pub struct Environment {
    root: PathBuf,
}

impl Environment {
    /// `$SHADERREEL_HOME` when set, otherwise `~/.shaderreel`.
    pub fn discover() -> Result<Self> {
        if let Some(root) = env_override(ENV_HOME) {
            return Ok(Self::at(root));
        }
        let base = BaseDirs::new().ok_or_else(|| anyhow!("failed to determine home directory"))?;
        Ok(Self::at(base.home_dir().join(DEFAULT_DIR_NAME)))
    }

    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn candidate_list(&self) -> PathBuf {
        self.root.join("shaders.txt")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("cache")
    }

    pub fn log_file(&self) -> PathBuf {
        self.root.join("log.txt")
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    /// Creates the root and cache directories and an empty candidate list.
    pub fn ensure(&self) -> Result<()> {
        for dir in [
            self.root.clone(),
            self.cache_dir().join("shaders"),
            self.cache_dir().join("images"),
        ] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        let list = self.candidate_list();
        if !list.exists() {
            fs::write(&list, "")
                .with_context(|| format!("failed to create {}", list.display()))?;
        }
        Ok(())
    }
}

fn env_override(name: &str) -> Option<PathBuf> {
    match env::var_os(name) {
        Some(value) if !value.as_os_str().is_empty() => Some(PathBuf::from(value)),
        _ => None,
    }
}
