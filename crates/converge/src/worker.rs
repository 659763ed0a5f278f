//! Coordinator - ties drivers, hooks, the graph and the engine into one run
//!
//! A run goes through fixed phases:
//!
//! 1. pre-apply hooks (first failure is fatal)
//! 2. driver construction for every resource (failures are consolidated),
//!    after rejecting duplicate names
//! 3. graph build and validation (structural errors are fatal)
//! 4. wave execution (node failures are consolidated after the run)
//! 5. post-apply hooks with their queries resolved against all outputs

use crate::context::{NoProgress, ProgressCallback};
use crate::driver::{BoxedDriver, DriverRegistry, SharedDriverOpts};
use crate::error::{ConsolidatedErrors, Error, GraphError, ResourceError, Result};
use crate::executor::{self, ExecuteSummary};
use crate::graph::{self, Graph};
use crate::hook::Hook;
use crate::query;
use crate::resource::{Document, Resource, ResourceSet};
use log::{debug, info, warn};
use rayon::prelude::*;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

/// Outcome of a successful run
#[derive(Debug, Clone, Default)]
pub struct ApplySummary {
    /// Resources whose driver applied them, in declaration order
    pub applied: Vec<String>,
    /// Resources whose driver declined to apply, in declaration order
    pub skipped: Vec<String>,
    /// Every resource's output, keyed by resource name
    pub outputs: Document,
    /// Engine statistics
    pub execution: ExecuteSummary,
}

struct NamedHook {
    name: String,
    hook: Box<dyn Hook>,
}

/// Applies resource sets with registered drivers and hooks
#[derive(Default)]
pub struct Worker {
    registry: DriverRegistry,
    hooks: Vec<NamedHook>,
}

impl Worker {
    /// Create a worker around an existing driver registry
    pub fn new(registry: DriverRegistry) -> Self {
        Self {
            registry,
            hooks: Vec::new(),
        }
    }

    /// Register a driver factory; see [`DriverRegistry::register`]
    pub fn register_driver<F>(&mut self, name: impl Into<String>, factory: F) -> Result<()>
    where
        F: Fn(&Resource, &SharedDriverOpts) -> anyhow::Result<BoxedDriver>
            + Send
            + Sync
            + 'static,
    {
        self.registry.register(name, factory)
    }

    /// Set the default driver; see [`DriverRegistry::set_default`]
    pub fn set_default_driver(&mut self, name: &str) -> Result<()> {
        self.registry.set_default(name)
    }

    /// Append a hook; hooks run in registration order
    pub fn register_hook(&mut self, name: impl Into<String>, hook: impl Hook + 'static) {
        self.hooks.push(NamedHook {
            name: name.into(),
            hook: Box::new(hook),
        });
    }

    /// The driver registry
    pub fn registry(&self) -> &DriverRegistry {
        &self.registry
    }

    /// Apply a resource set
    pub fn apply(&mut self, set: &ResourceSet, opts: &SharedDriverOpts) -> Result<ApplySummary> {
        self.apply_with_progress(set, opts, &mut NoProgress)
    }

    /// Apply a resource set, reporting engine progress
    pub fn apply_with_progress<P>(
        &mut self,
        set: &ResourceSet,
        opts: &SharedDriverOpts,
        progress: &mut P,
    ) -> Result<ApplySummary>
    where
        P: ProgressCallback + ?Sized,
    {
        if self.registry.is_empty() {
            return Err(self.fatal(Error::NoDriversRegistered));
        }

        for named in &mut self.hooks {
            if let Err(error) = named.hook.pre_apply() {
                let err = Error::Hook {
                    name: named.name.clone(),
                    error,
                };
                named.hook.on_error(&err);
                return Err(err);
            }
        }

        if let Some(name) = graph::find_duplicate(&set.resources) {
            let err = GraphError::DuplicateResource(name.to_string());
            return Err(self.fatal(err.into()));
        }

        let drivers = self.construct_drivers(&set.resources, opts)?;

        let mut graph = match Graph::build(&set.resources) {
            Ok(graph) => graph,
            Err(err) => return Err(self.fatal(err.into())),
        };

        let skipped = Mutex::new(Vec::new());
        let execution = executor::execute_with_progress(
            &mut graph,
            |resource| apply_resource(&drivers, resource, &skipped),
            progress,
        )
        .map_err(|err| self.fatal(err))?;

        let mut errors = ConsolidatedErrors::new();
        for (name, error) in graph.into_failures() {
            errors.insert(name, error);
        }
        if !errors.is_empty() {
            return Err(self.consolidated(errors));
        }

        let outputs = match gather_outputs(&set.resources, &drivers) {
            Ok(outputs) => outputs,
            Err(err) => return Err(self.fatal(err)),
        };
        self.run_post_apply(&outputs)?;

        let skipped = skipped
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let applied = set
            .resources
            .iter()
            .filter(|r| !skipped.contains(&r.name))
            .map(|r| r.name.clone())
            .collect();
        let skipped = set
            .resources
            .iter()
            .filter(|r| skipped.contains(&r.name))
            .map(|r| r.name.clone())
            .collect();

        Ok(ApplySummary {
            applied,
            skipped,
            outputs,
            execution,
        })
    }

    /// Build one driver per resource, consolidating every failure
    fn construct_drivers(
        &mut self,
        resources: &[Resource],
        opts: &SharedDriverOpts,
    ) -> Result<HashMap<String, BoxedDriver>> {
        let mut drivers = HashMap::with_capacity(resources.len());
        let mut errors = ConsolidatedErrors::new();

        for resource in resources {
            match self.registry.instantiate(resource, opts) {
                Ok(driver) => {
                    debug!("constructed driver for resource {}", resource.name);
                    drivers.insert(resource.name.clone(), driver);
                }
                Err(error) => {
                    warn!("could not build driver for {}: {}", resource.name, error);
                    errors.insert(resource.name.clone(), error);
                }
            }
        }

        if errors.is_empty() {
            Ok(drivers)
        } else {
            Err(self.consolidated(errors))
        }
    }

    /// Resolve each hook's data template and hand it over, stopping at the first failure
    fn run_post_apply(&mut self, outputs: &Document) -> Result<()> {
        for named in &mut self.hooks {
            let queries = named.hook.data_queries();
            let data = query::populate_queries(&queries, outputs).map_err(|e| Error::Hook {
                name: named.name.clone(),
                error: e.into(),
            })?;

            named.hook.post_apply(&data).map_err(|error| Error::Hook {
                name: named.name.clone(),
                error,
            })?;
        }
        Ok(())
    }

    fn fatal(&mut self, err: Error) -> Error {
        for named in &mut self.hooks {
            named.hook.on_error(&err);
        }
        err
    }

    fn consolidated(&mut self, errors: ConsolidatedErrors) -> Error {
        for named in &mut self.hooks {
            named.hook.on_consolidated_errors(&errors);
        }
        Error::Consolidated(errors)
    }
}

/// The callback the engine runs for every node
fn apply_resource(
    drivers: &HashMap<String, BoxedDriver>,
    resource: &Resource,
    skipped: &Mutex<Vec<String>>,
) -> std::result::Result<(), ResourceError> {
    let driver = drivers.get(&resource.name).ok_or_else(|| {
        ResourceError::Apply(anyhow::anyhow!(
            "no driver constructed for resource '{}'",
            resource.name
        ))
    })?;

    let mut data = Document::new();
    for dependency in &resource.dependencies {
        let output = drivers
            .get(dependency)
            .map_or_else(|| Ok(Document::new()), |d| d.output())
            .map_err(|error| ResourceError::Output {
                dependency: dependency.clone(),
                error,
            })?;
        data.insert(dependency.clone(), Value::Object(output));
    }

    let resolved = Resource {
        config: query::populate_queries(&resource.config, &data)?,
        ..resource.clone()
    };

    if !driver.should_apply(&resolved) {
        info!("skipping resource {}: driver reported nothing to apply", resource.name);
        skipped
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(resource.name.clone());
        return Ok(());
    }

    info!("running apply for resource {}", resource.name);
    driver.apply(&resolved)?;
    Ok(())
}

/// Read every resource's output in parallel
fn gather_outputs(
    resources: &[Resource],
    drivers: &HashMap<String, BoxedDriver>,
) -> Result<Document> {
    let collected: Vec<(String, anyhow::Result<Document>)> = resources
        .par_iter()
        .map(|resource| {
            let output = drivers
                .get(&resource.name)
                .map_or_else(|| Ok(Document::new()), |d| d.output());
            (resource.name.clone(), output)
        })
        .collect();

    let mut outputs = Document::new();
    for (name, output) in collected {
        match output {
            Ok(output) => {
                outputs.insert(name, Value::Object(output));
            }
            Err(error) => {
                return Err(Error::Output {
                    resource: name,
                    error,
                });
            }
        }
    }
    Ok(outputs)
}
