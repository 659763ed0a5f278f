//! Progress and diagnostic provider traits
//!
//! These traits allow the crate to be used without depending on a specific
//! terminal UI or logging backend.

use crate::graph::NodeState;
use log::{error, info, warn};

/// Progress callback for execution runs
///
/// All methods are called from the coordinating thread, never from wave
/// workers.
pub trait ProgressCallback {
    /// Called when a wave of mutually independent resources is launched
    fn on_wave_start(&mut self, count: usize);

    /// Called for each resource handed to a worker
    fn on_resource_start(&mut self, name: &str);

    /// Called when a resource reaches a terminal state
    fn on_resource_complete(&mut self, name: &str, state: &NodeState);

    /// Called once every worker of the wave has returned
    fn on_wave_complete(&mut self);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_wave_start(&mut self, _count: usize) {}
    fn on_resource_start(&mut self, _name: &str) {}
    fn on_resource_complete(&mut self, _name: &str, _state: &NodeState) {}
    fn on_wave_complete(&mut self) {}
}

/// Sink for diagnostic messages emitted by drivers
///
/// Shared by every driver of a run, so implementations must be thread-safe.
pub trait DiagnosticSink: Send + Sync {
    /// Informational message about a resource
    fn info(&self, resource: &str, message: &str);

    /// Something unexpected that did not fail the resource
    fn warn(&self, resource: &str, message: &str);

    /// Failure detail beyond the returned error
    fn error(&self, resource: &str, message: &str);
}

/// Diagnostic sink that forwards to the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDiagnostics;

impl DiagnosticSink for LogDiagnostics {
    fn info(&self, resource: &str, message: &str) {
        info!("[{}] {}", resource, message);
    }

    fn warn(&self, resource: &str, message: &str) {
        warn!("[{}] {}", resource, message);
    }

    fn error(&self, resource: &str, message: &str) {
        error!("[{}] {}", resource, message);
    }
}
