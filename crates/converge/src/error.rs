//! Error types for graph validation, query resolution and apply runs.
//!
//! Errors are split by blast radius. [`GraphError`] and the fatal variants of
//! [`Error`] abort a whole run before any side effect. [`ResourceError`] is
//! attached to a single resource and collected into [`ConsolidatedErrors`]
//! so independent resources keep going.

use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Result alias for coordinator operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Structural defects in a resource set's dependency declarations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// Two resources share a name
    #[error("duplicate resource name: {0}")]
    DuplicateResource(String),

    /// A dependency names a resource that is not declared
    #[error("invalid dependency '{dependency}' for resource '{resource}'")]
    InvalidDependency {
        /// Resource declaring the dependency
        resource: String,
        /// The undeclared name
        dependency: String,
    },

    /// Following dependencies from `resource` leads back to `dependency`
    #[error("circular dependency detected: '{resource}' -> '{dependency}'")]
    CircularDependency {
        /// Resource whose edge closes the cycle
        resource: String,
        /// Resource already on the resolution path
        dependency: String,
    },
}

/// Errors from evaluating a query template against a document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// The template matched nothing
    #[error("no query result")]
    NoResult,

    /// The template could not be parsed
    #[error("invalid query '{query}': {message}")]
    Parse {
        /// The offending template
        query: String,
        /// What was wrong with it
        message: String,
    },
}

/// Failure attached to one resource.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// A direct dependency ended in failure, so this resource never ran
    #[error("dependency '{dependency}' failed")]
    DependencyFailed {
        /// Name of the failed parent
        dependency: String,
    },

    /// The resource's own apply returned an error
    #[error(transparent)]
    Apply(#[from] anyhow::Error),

    /// The driver factory refused to build a driver for this resource
    #[error("could not construct '{driver}' driver: {error:#}")]
    Construct {
        /// Driver kind that was requested
        driver: String,
        /// Error returned by the factory
        error: anyhow::Error,
    },

    /// No driver named and no default configured
    #[error("no driver specified and no default driver is configured")]
    NoDefaultDriver,

    /// The named driver is not registered
    #[error("no driver found with name '{0}'")]
    UnknownDriver(String),

    /// A query embedded in the config could not be resolved
    #[error("could not resolve config: {0}")]
    Query(#[from] QueryError),

    /// Reading a dependency's output failed
    #[error("could not read output of dependency '{dependency}': {error:#}")]
    Output {
        /// Dependency whose output was requested
        dependency: String,
        /// Error returned by the dependency's driver
        error: anyhow::Error,
    },

    /// The apply callback panicked
    #[error("apply panicked: {0}")]
    Panicked(String),
}

impl ResourceError {
    /// Whether the failure was inherited from a dependency rather than caused here
    pub fn is_inherited(&self) -> bool {
        matches!(self, Self::DependencyFailed { .. })
    }
}

/// Per-resource failures gathered over a whole phase, keyed by resource name.
#[derive(Debug, Default)]
pub struct ConsolidatedErrors {
    errors: BTreeMap<String, ResourceError>,
}

impl ConsolidatedErrors {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure for a resource, replacing any earlier one
    pub fn insert(&mut self, resource: impl Into<String>, error: ResourceError) {
        self.errors.insert(resource.into(), error);
    }

    /// Error recorded for a resource
    pub fn get(&self, resource: &str) -> Option<&ResourceError> {
        self.errors.get(resource)
    }

    /// Whether a resource has a recorded failure
    pub fn contains(&self, resource: &str) -> bool {
        self.errors.contains_key(resource)
    }

    /// Number of failed resources
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Check if nothing failed
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Failed resource names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.errors.keys().map(String::as_str)
    }

    /// Iterate over `(resource, error)` pairs, sorted by resource name
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ResourceError)> {
        self.errors.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl fmt::Display for ConsolidatedErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, error)) in self.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}: {}", name, error)?;
        }
        Ok(())
    }
}

impl IntoIterator for ConsolidatedErrors {
    type Item = (String, ResourceError);
    type IntoIter = std::collections::btree_map::IntoIter<String, ResourceError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}

/// Errors surfaced by a coordinator run.
#[derive(Debug, Error)]
pub enum Error {
    /// Nothing can be applied without at least one driver
    #[error("no drivers registered")]
    NoDriversRegistered,

    /// A driver was registered twice under one name
    #[error("driver with name '{0}' already exists")]
    DriverExists(String),

    /// The default driver must be registered first
    #[error("attempting to set default driver with name '{0}' that does not exist")]
    UnknownDefaultDriver(String),

    /// The resource set's dependency declarations are malformed
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// A lifecycle hook failed
    #[error("error running hook '{name}': {error:#}")]
    Hook {
        /// Name the hook was registered under
        name: String,
        /// Error returned by the hook
        error: anyhow::Error,
    },

    /// One or more resources failed; see the map for each failure
    #[error("errors were encountered with {} resource(s)", .0.len())]
    Consolidated(ConsolidatedErrors),

    /// Reading a resource's output after a successful run failed
    #[error("could not read output of resource '{resource}': {error:#}")]
    Output {
        /// Resource whose output was requested
        resource: String,
        /// Error returned by its driver
        error: anyhow::Error,
    },

    /// The worker pool for a wave could not be started
    #[error("failed to create apply thread pool: {0}")]
    ThreadPool(String),
}

impl Error {
    /// Per-resource failures, when this is a consolidated error
    pub fn consolidated(&self) -> Option<&ConsolidatedErrors> {
        match self {
            Self::Consolidated(errors) => Some(errors),
            _ => None,
        }
    }

    /// Whether this error came from the resource set's structure
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::Graph(_))
    }
}
