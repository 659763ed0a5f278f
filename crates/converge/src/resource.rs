//! Declared resources and the documents they carry
//!
//! A [`Resource`] is one unit of work: a name, the driver that knows how to
//! apply it, three opaque documents and the names of the resources it depends
//! on. Resources are immutable once loaded; everything the core derives from
//! them (graph nodes, outputs) lives elsewhere.

use serde::{Deserialize, Serialize};

/// Structured document: a mapping of string keys to arbitrary values
pub type Document = serde_json::Map<String, serde_json::Value>;

/// A declared set of resources, as loaded from an input document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSet {
    /// Document format version
    #[serde(default)]
    pub version: String,
    /// Resources in declaration order
    #[serde(default)]
    pub resources: Vec<Resource>,
}

impl ResourceSet {
    /// Find a resource by name
    pub fn find(&self, name: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.name == name)
    }

    /// Number of declared resources
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Check if no resources are declared
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// One declared unit of infrastructure to provision
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Unique name within its resource set
    pub name: String,

    /// Driver kind; empty selects the configured default
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub driver: String,

    /// Where the resource comes from (chart, module, manifest path)
    #[serde(default, skip_serializing_if = "Document::is_empty")]
    pub source: Document,

    /// Where the resource is applied (cluster, namespace)
    #[serde(default, skip_serializing_if = "Document::is_empty")]
    pub target: Document,

    /// Driver configuration; string leaves may hold query templates
    #[serde(default, skip_serializing_if = "Document::is_empty")]
    pub config: Document,

    /// Names of resources that must finish first, in declared order
    #[serde(default, rename = "depends_on", skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

impl Resource {
    /// Create a resource with only a name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the driver kind
    pub fn with_driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = driver.into();
        self
    }

    /// Append a dependency
    pub fn depends_on(mut self, dependency: impl Into<String>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    /// Replace the config document
    pub fn with_config(mut self, config: Document) -> Self {
        self.config = config;
        self
    }

    /// Whether the resource asks for the default driver
    pub fn uses_default_driver(&self) -> bool {
        self.driver.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_resource_set() {
        let raw = json!({
            "version": "v1",
            "resources": [
                { "name": "db", "driver": "terraform", "source": { "kind": "local", "path": "./db" } },
                { "name": "web", "depends_on": ["db"], "config": { "host": "{ .db.host }" } }
            ]
        });

        let set: ResourceSet = serde_json::from_value(raw).unwrap();

        assert_eq!(set.len(), 2);
        assert_eq!(set.resources[0].driver, "terraform");
        assert!(set.resources[0].dependencies.is_empty());

        let web = set.find("web").unwrap();
        assert!(web.uses_default_driver());
        assert_eq!(web.dependencies, vec!["db".to_string()]);
        assert_eq!(web.config["host"], json!("{ .db.host }"));
    }

    #[test]
    fn test_builder_preserves_dependency_order() {
        let resource = Resource::new("app").depends_on("b").depends_on("a");
        assert_eq!(resource.dependencies, vec!["b", "a"]);
    }
}
