//! # Converge
//!
//! Dependency-ordered provisioning of heterogeneous infrastructure resources.
//!
//! A resource set declares units of work (charts, manifests, modules), which
//! backend applies each one and what each one depends on. This crate
//! validates the dependency graph, runs resources wave by wave with every
//! ready resource on its own thread and threads one resource's outputs into
//! another's configuration through embedded queries.
//!
//! ## Core Concepts
//!
//! - **Resource**: A named unit of work with source, target and config documents
//! - **Driver**: Backend adapter that applies a resource and reports its outputs
//! - **Graph**: Validated dependency graph of nodes wrapping resources
//! - **Executor**: Wave-based engine that propagates failures to dependents
//! - **Worker**: Coordinator running hooks, drivers, graph and engine in order
//!
//! ## Example
//!
//! ```ignore
//! use converge::{
//!     BoxedDriver, Document, Driver, DriverRegistry, Resource, ResourceSet,
//!     SharedDriverOpts, Worker,
//! };
//!
//! struct NoopDriver;
//!
//! impl Driver for NoopDriver {
//!     fn apply(&self, _resource: &Resource) -> anyhow::Result<()> {
//!         Ok(())
//!     }
//!
//!     fn output(&self) -> anyhow::Result<Document> {
//!         Ok(Document::new())
//!     }
//! }
//!
//! let mut registry = DriverRegistry::new();
//! registry.register("noop", |_: &Resource, _: &SharedDriverOpts| -> anyhow::Result<BoxedDriver> {
//!     Ok(Box::new(NoopDriver))
//! })?;
//! registry.set_default("noop")?;
//!
//! let set = ResourceSet {
//!     version: "v1".into(),
//!     resources: vec![Resource::new("db"), Resource::new("web").depends_on("db")],
//! };
//!
//! let mut worker = Worker::new(registry);
//! let summary = worker.apply(&set, &SharedDriverOpts::new("."))?;
//! ```
//!
//! ## Queries
//!
//! String leaves of a config document may hold brace-delimited path queries
//! such as `"{ .db.host }:5432"`. Before a resource is applied, each query is
//! resolved against the outputs of the resource's direct dependencies; see
//! [`query`] for the grammar.
//!
//! ## Provider Traits
//!
//! - [`ProgressCallback`]: Receives wave and resource progress
//! - [`DiagnosticSink`]: Receives driver diagnostics
//! - [`Hook`]: Runs before and after an apply and observes its errors

pub mod context;
pub mod driver;
pub mod error;
pub mod executor;
pub mod graph;
pub mod hook;
pub mod query;
pub mod resource;
pub mod worker;

// Re-export main types at crate root
pub use context::{DiagnosticSink, LogDiagnostics, NoProgress, ProgressCallback};
pub use driver::{BoxedDriver, Driver, DriverFactory, DriverRegistry, SharedDriverOpts};
pub use error::{ConsolidatedErrors, Error, GraphError, QueryError, ResourceError, Result};
pub use executor::{ExecuteSummary, execute, execute_with_progress};
pub use graph::{Graph, Node, NodeState};
pub use hook::Hook;
pub use query::{is_query, populate_queries, resolve};
pub use resource::{Document, Resource, ResourceSet};
pub use worker::{ApplySummary, Worker};
