use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Get the config directory path
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("switchboard"))
}

/// User configuration from `~/.config/switchboard/config.toml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Driver for resources that do not name one
    pub default_driver: String,
    /// Directory relative source paths resolve against
    pub base_dir: Option<String>,
    pub tools: Tools,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_driver: "helm".to_string(),
            base_dir: None,
            tools: Tools::default(),
        }
    }
}

/// Executables the built-in drivers call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tools {
    pub helm: String,
    pub kubectl: String,
    pub terraform: String,
}

impl Default for Tools {
    fn default() -> Self {
        Self {
            helm: "helm".to_string(),
            kubectl: "kubectl".to_string(),
            terraform: "terraform".to_string(),
        }
    }
}

impl Config {
    /// Load the user config; a missing file means defaults
    pub fn load() -> Result<Self> {
        Self::load_from(&config_dir()?.join("config.toml"))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid config in {}", path.display()))
    }

    /// Get expanded base directory path
    pub fn base_dir_path(&self) -> Option<PathBuf> {
        self.base_dir
            .as_deref()
            .map(|dir| PathBuf::from(shellexpand::tilde(dir).as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.default_driver, "helm");
        assert_eq!(config.tools.kubectl, "kubectl");
    }

    #[test]
    fn test_partial_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "default_driver = \"terraform\"\n\n[tools]\nhelm = \"/opt/helm/bin/helm\"\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.default_driver, "terraform");
        assert_eq!(config.tools.helm, "/opt/helm/bin/helm");
        assert_eq!(config.tools.terraform, "terraform");
        assert_eq!(config.base_dir_path(), None);
    }

    #[test]
    fn test_invalid_file_names_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "default_driver = [").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().starts_with("Invalid config in"));
    }

    #[test]
    fn test_base_dir_expands_tilde() {
        let config = Config {
            base_dir: Some("~/infra".to_string()),
            ..Config::default()
        };
        let expanded = config.base_dir_path().unwrap();
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.ends_with("infra"));
    }
}
