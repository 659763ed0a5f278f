pub mod apply;
pub mod plan;
pub mod validate;

use anyhow::{Context, Result};
use converge::{DriverRegistry, ResourceSet};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::drivers;
use crate::loader;

/// Resource set plus the settings every command resolves the same way
pub struct Input {
    pub path: PathBuf,
    pub set: ResourceSet,
    pub config: Config,
    pub default_driver: String,
}

impl Input {
    pub fn load(path: &Path, default_driver: Option<&str>) -> Result<Self> {
        let config = Config::load()?;
        let set = loader::load_resource_set(path)?;
        let default_driver = default_driver
            .map_or_else(|| config.default_driver.clone(), ToString::to_string);

        Ok(Self {
            path: path.to_path_buf(),
            set,
            config,
            default_driver,
        })
    }

    pub fn registry(&self) -> Result<DriverRegistry> {
        drivers::registry(&self.config.tools, &self.default_driver)
            .with_context(|| format!("Invalid default driver '{}'", self.default_driver))
    }

    /// Flag, then config, then the input file's directory
    pub fn base_dir(&self, flag: Option<&Path>) -> PathBuf {
        flag.map(Path::to_path_buf)
            .or_else(|| self.config.base_dir_path())
            .unwrap_or_else(|| {
                self.path
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(path: &str, config: Config) -> Input {
        Input {
            path: PathBuf::from(path),
            set: ResourceSet::default(),
            default_driver: config.default_driver.clone(),
            config,
        }
    }

    #[test]
    fn test_base_dir_precedence() {
        let from_file = input("infra/prod/switchboard.json", Config::default());
        assert_eq!(from_file.base_dir(None), PathBuf::from("infra/prod"));
        assert_eq!(
            from_file.base_dir(Some(Path::new("/srv"))),
            PathBuf::from("/srv")
        );

        let bare = input("switchboard.json", Config::default());
        assert_eq!(bare.base_dir(None), PathBuf::from("."));

        let configured = input(
            "infra/switchboard.json",
            Config {
                base_dir: Some("/opt/infra".to_string()),
                ..Config::default()
            },
        );
        assert_eq!(configured.base_dir(None), PathBuf::from("/opt/infra"));
    }

    #[test]
    fn test_registry_rejects_unknown_default() {
        let mut bad = input("switchboard.json", Config::default());
        bad.default_driver = "pulumi".to_string();
        let err = bad.registry().unwrap_err();
        assert_eq!(err.to_string(), "Invalid default driver 'pulumi'");
    }
}
