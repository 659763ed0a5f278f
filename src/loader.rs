//! Reads resource sets and standalone documents from JSON, TOML or YAML files

use anyhow::{Context, Result};
use converge::{Document, ResourceSet};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

const SUPPORTED_VERSION: &str = "v1";

/// Load a resource set, choosing the format from the file extension
pub fn load_resource_set(path: &Path) -> Result<ResourceSet> {
    let set: ResourceSet = read(path)?;

    if !set.version.is_empty() && set.version != SUPPORTED_VERSION {
        log::warn!(
            "{}: unknown version \"{}\", reading as {}",
            path.display(),
            set.version,
            SUPPORTED_VERSION
        );
    }
    log::debug!("loaded {} resource(s) from {}", set.len(), path.display());

    Ok(set)
}

/// Load a single document, such as a base manifest
pub fn read_document(path: &Path) -> Result<Document> {
    read(path)
}

fn read<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Could not read {}", path.display()))?;

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => {
            toml::from_str(&content).with_context(|| format!("Invalid TOML in {}", path.display()))
        }
        Some("yaml" | "yml") => serde_yaml::from_str(&content)
            .with_context(|| format!("Invalid YAML in {}", path.display())),
        _ => serde_json::from_str(&content)
            .with_context(|| format!("Invalid JSON in {}", path.display())),
    }
}
