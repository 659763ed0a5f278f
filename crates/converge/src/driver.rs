//! Driver capability and registry
//!
//! A driver knows how to apply one backend's kind of resource. The core only
//! talks to the [`Driver`] trait; concrete backends register a factory under
//! a name in a [`DriverRegistry`] which is handed to the coordinator.

use crate::context::{DiagnosticSink, LogDiagnostics};
use crate::error::{Error, ResourceError};
use crate::resource::{Document, Resource};
use anyhow::Result;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Backend adapter for one resource
///
/// A driver instance is built per resource before the run starts. It is
/// shared read-only with the wave workers, so any state recorded by
/// [`Driver::apply`] needs interior mutability.
///
/// # Example
///
/// ```ignore
/// use converge::{Document, Driver, Resource};
/// use std::sync::OnceLock;
///
/// #[derive(Default)]
/// struct EchoDriver {
///     output: OnceLock<Document>,
/// }
///
/// impl Driver for EchoDriver {
///     fn apply(&self, resource: &Resource) -> anyhow::Result<()> {
///         let _ = self.output.set(resource.config.clone());
///         Ok(())
///     }
///
///     fn output(&self) -> anyhow::Result<Document> {
///         Ok(self.output.get().cloned().unwrap_or_default())
///     }
/// }
/// ```
pub trait Driver: Send + Sync {
    /// Pre-flight gate; returning false skips [`Driver::apply`] and counts
    /// the resource as succeeded
    fn should_apply(&self, _resource: &Resource) -> bool {
        true
    }

    /// Provision the resource
    ///
    /// `resource.config` has already had its queries resolved. Called at
    /// most once per run.
    fn apply(&self, resource: &Resource) -> Result<()>;

    /// Observable state after a successful apply
    ///
    /// Must not panic when called before apply or after a failed apply;
    /// return an empty document or an error instead.
    fn output(&self) -> Result<Document>;
}

/// Options shared by every driver built during one run
#[derive(Clone)]
pub struct SharedDriverOpts {
    /// Directory relative source paths are resolved against
    pub base_dir: PathBuf,
    /// Where drivers send diagnostic messages
    pub diagnostics: Arc<dyn DiagnosticSink>,
}

impl SharedDriverOpts {
    /// Create options with the default log-backed diagnostics
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            diagnostics: Arc::new(LogDiagnostics),
        }
    }

    /// Replace the diagnostic sink
    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn DiagnosticSink>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Resolve a possibly relative path against the base directory
    pub fn resolve_path(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

impl fmt::Debug for SharedDriverOpts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedDriverOpts")
            .field("base_dir", &self.base_dir)
            .finish_non_exhaustive()
    }
}

/// A boxed driver for type-erased storage
pub type BoxedDriver = Box<dyn Driver>;

/// Builds a driver for one resource
pub type DriverFactory =
    Box<dyn Fn(&Resource, &SharedDriverOpts) -> Result<BoxedDriver> + Send + Sync>;

/// Named driver factories plus an optional default
#[derive(Default)]
pub struct DriverRegistry {
    factories: BTreeMap<String, DriverFactory>,
    default_driver: Option<String>,
}

impl DriverRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under a unique name
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> Result<(), Error>
    where
        F: Fn(&Resource, &SharedDriverOpts) -> Result<BoxedDriver> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(Error::DriverExists(name));
        }
        self.factories.insert(name, Box::new(factory));
        Ok(())
    }

    /// Choose the driver used by resources that do not name one
    pub fn set_default(&mut self, name: &str) -> Result<(), Error> {
        if !self.factories.contains_key(name) {
            return Err(Error::UnknownDefaultDriver(name.to_string()));
        }
        self.default_driver = Some(name.to_string());
        Ok(())
    }

    /// Name of the default driver, if one is set
    pub fn default_driver(&self) -> Option<&str> {
        self.default_driver.as_deref()
    }

    /// Registered driver names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Check if no drivers are registered
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Driver kind a resource resolves to, after applying the default
    pub fn kind_for<'a>(&'a self, resource: &'a Resource) -> Result<&'a str, ResourceError> {
        if resource.uses_default_driver() {
            return self.default_driver().ok_or(ResourceError::NoDefaultDriver);
        }
        if self.factories.contains_key(&resource.driver) {
            Ok(resource.driver.as_str())
        } else {
            Err(ResourceError::UnknownDriver(resource.driver.clone()))
        }
    }

    /// Build the driver for a resource
    pub fn instantiate(
        &self,
        resource: &Resource,
        opts: &SharedDriverOpts,
    ) -> Result<BoxedDriver, ResourceError> {
        let kind = self.kind_for(resource)?;
        let factory = &self.factories[kind];
        factory(resource, opts).map_err(|error| ResourceError::Construct {
            driver: kind.to_string(),
            error,
        })
    }
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("drivers", &self.factories.keys().collect::<Vec<_>>())
            .field("default_driver", &self.default_driver)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::OnceLock;

    #[derive(Default)]
    struct EchoDriver {
        output: OnceLock<Document>,
    }

    impl Driver for EchoDriver {
        fn apply(&self, resource: &Resource) -> Result<()> {
            let _ = self.output.set(resource.config.clone());
            Ok(())
        }

        fn output(&self) -> Result<Document> {
            Ok(self.output.get().cloned().unwrap_or_default())
        }
    }

    fn echo_factory(_: &Resource, _: &SharedDriverOpts) -> Result<BoxedDriver> {
        Ok(Box::new(EchoDriver::default()))
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let mut registry = DriverRegistry::new();
        registry.register("echo", echo_factory).unwrap();

        let err = registry.register("echo", echo_factory).unwrap_err();
        assert!(matches!(err, Error::DriverExists(name) if name == "echo"));
    }

    #[test]
    fn test_set_default_requires_registration() {
        let mut registry = DriverRegistry::new();
        assert!(matches!(
            registry.set_default("helm"),
            Err(Error::UnknownDefaultDriver(_))
        ));

        registry.register("helm", echo_factory).unwrap();
        registry.set_default("helm").unwrap();
        assert_eq!(registry.default_driver(), Some("helm"));
    }

    #[test]
    fn test_kind_for_applies_default() {
        let mut registry = DriverRegistry::new();
        registry.register("echo", echo_factory).unwrap();

        let unnamed = Resource::new("a");
        assert!(matches!(
            registry.kind_for(&unnamed),
            Err(ResourceError::NoDefaultDriver)
        ));

        registry.set_default("echo").unwrap();
        assert_eq!(registry.kind_for(&unnamed).unwrap(), "echo");

        let unknown = Resource::new("b").with_driver("nope");
        assert!(matches!(
            registry.kind_for(&unknown),
            Err(ResourceError::UnknownDriver(name)) if name == "nope"
        ));
    }

    #[test]
    fn test_instantiate_wraps_factory_errors() {
        let mut registry = DriverRegistry::new();
        registry
            .register("broken", |_: &Resource, _: &SharedDriverOpts| -> Result<BoxedDriver> {
                anyhow::bail!("missing source.path")
            })
            .unwrap();

        let resource = Resource::new("a").with_driver("broken");
        let err = registry
            .instantiate(&resource, &SharedDriverOpts::new("."))
            .err()
            .unwrap();
        assert_eq!(
            err.to_string(),
            "could not construct 'broken' driver: missing source.path"
        );
    }

    #[test]
    fn test_output_before_apply_is_empty() {
        let driver = EchoDriver::default();
        assert!(driver.output().unwrap().is_empty());
    }

    #[test]
    fn test_resolve_path() {
        let opts = SharedDriverOpts::new("/srv/app");
        assert_eq!(opts.resolve_path("infra"), PathBuf::from("/srv/app/infra"));
        assert_eq!(opts.resolve_path("/abs"), PathBuf::from("/abs"));
    }
}
