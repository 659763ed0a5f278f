//! Execution engine - applies graph nodes wave by wave
//!
//! Each wave launches every pending node whose parents have all finished,
//! one worker thread per node, and waits for all of them before looking for
//! the next wave. A failed parent fails its children without calling the
//! apply callback, so a failing subtree still drains to terminal states
//! while unrelated branches carry on. Nothing is retried, timed out or
//! cancelled.

use crate::context::{NoProgress, ProgressCallback};
use crate::error::{Error, ResourceError};
use crate::graph::{Graph, NodeState};
use crate::resource::Resource;
use log::{debug, error, info};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;

/// Summary of an execution run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecuteSummary {
    /// Number of waves launched
    pub waves: usize,
    /// Nodes that ended Succeeded
    pub succeeded: usize,
    /// Nodes whose own apply failed
    pub failed: usize,
    /// Nodes failed because a parent failed
    pub dependency_failed: usize,
}

impl ExecuteSummary {
    /// Check if every node succeeded
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.dependency_failed == 0
    }

    /// Total number of nodes that reached a terminal state
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.dependency_failed
    }

    fn add_state(&mut self, state: &NodeState) {
        match state {
            NodeState::Succeeded => self.succeeded += 1,
            NodeState::Failed(err) if err.is_inherited() => self.dependency_failed += 1,
            NodeState::Failed(_) => self.failed += 1,
            NodeState::Pending | NodeState::Running => {}
        }
    }
}

/// One node handed to a wave worker
struct Job<'a> {
    index: usize,
    resource: &'a Resource,
    failed_parent: Option<String>,
}

/// Execute every node of the graph
///
/// Node failures are recorded on the nodes (see [`Graph::failures`]); the
/// returned error only covers the engine itself failing to start workers.
pub fn execute<F>(graph: &mut Graph, apply: F) -> Result<ExecuteSummary, Error>
where
    F: Fn(&Resource) -> Result<(), ResourceError> + Sync,
{
    execute_with_progress(graph, apply, &mut NoProgress)
}

/// Execute every node of the graph, reporting progress
pub fn execute_with_progress<F, P>(
    graph: &mut Graph,
    apply: F,
    progress: &mut P,
) -> Result<ExecuteSummary, Error>
where
    F: Fn(&Resource) -> Result<(), ResourceError> + Sync,
    P: ProgressCallback + ?Sized,
{
    let mut summary = ExecuteSummary::default();

    loop {
        let ready = ready_nodes(graph);

        if ready.is_empty() {
            if !graph.is_complete() {
                // Only reachable if the graph bypassed validation
                error!("no runnable resources left but the run is not complete");
            }
            break;
        }

        summary.waves += 1;
        info!(
            "wave {}: applying {} resource(s)",
            summary.waves,
            ready.len()
        );
        progress.on_wave_start(ready.len());

        for &index in &ready {
            let node = &mut graph.nodes_mut()[index];
            node.start();
            progress.on_resource_start(node.name());
        }

        // Parents are terminal before launch and nothing touches them during the wave
        let jobs: Vec<Job<'_>> = ready
            .iter()
            .map(|&index| Job {
                index,
                resource: graph.nodes()[index].resource(),
                failed_parent: graph
                    .parents_of(index)
                    .find(|parent| parent.state().is_failed())
                    .map(|parent| parent.name().to_string()),
            })
            .collect();

        let outcomes = run_wave(&jobs, &apply)?;
        drop(jobs);

        for (index, outcome) in outcomes {
            let node = &mut graph.nodes_mut()[index];
            match &outcome {
                Ok(()) => info!("applied resource {}", node.name()),
                Err(err) => error!("resource {} failed: {}", node.name(), err),
            }
            node.finish(outcome);
            summary.add_state(node.state());
            progress.on_resource_complete(node.name(), node.state());
        }

        progress.on_wave_complete();
    }

    debug!("execution finished: {:?}", summary);
    Ok(summary)
}

/// Pending nodes whose parents are all terminal
fn ready_nodes(graph: &Graph) -> Vec<usize> {
    graph
        .nodes()
        .iter()
        .enumerate()
        .filter(|(index, node)| {
            matches!(node.state(), NodeState::Pending)
                && graph.parents_of(*index).all(|p| p.state().is_terminal())
        })
        .map(|(index, _)| index)
        .collect()
}

/// Run one wave on a pool sized to the wave and collect every outcome
fn run_wave<F>(
    jobs: &[Job<'_>],
    apply: &F,
) -> Result<Vec<(usize, Result<(), ResourceError>)>, Error>
where
    F: Fn(&Resource) -> Result<(), ResourceError> + Sync,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.len())
        .thread_name(|i| format!("converge-wave-{}", i))
        .build()
        .map_err(|e| Error::ThreadPool(e.to_string()))?;

    let (tx, rx) = mpsc::channel();

    pool.scope(|scope| {
        for job in jobs {
            let tx = tx.clone();
            scope.spawn(move |_| {
                let outcome = run_job(job, apply);
                // The receiver outlives the scope
                let _ = tx.send((job.index, outcome));
            });
        }
    });

    drop(tx);
    Ok(rx.into_iter().collect())
}

fn run_job<F>(job: &Job<'_>, apply: &F) -> Result<(), ResourceError>
where
    F: Fn(&Resource) -> Result<(), ResourceError> + Sync,
{
    if let Some(dependency) = &job.failed_parent {
        return Err(ResourceError::DependencyFailed {
            dependency: dependency.clone(),
        });
    }

    match panic::catch_unwind(AssertUnwindSafe(|| apply(job.resource))) {
        Ok(outcome) => outcome,
        Err(payload) => Err(ResourceError::Panicked(panic_message(&*payload))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
