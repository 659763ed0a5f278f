//! Dependency graph - validates declared dependencies and wraps resources in nodes
//!
//! Building a [`Graph`] checks the whole resource set before anything runs:
//! names must be unique, every dependency must exist and following
//! dependencies must never lead back to where it started. Each node keeps
//! direct parent indices only; a node's parents being done implies its
//! ancestors are done.

use crate::error::{GraphError, ResourceError};
use crate::resource::Resource;
use std::collections::{HashMap, HashSet};

/// Lifecycle of one node during a run
#[derive(Debug, Default)]
pub enum NodeState {
    /// Not started yet
    #[default]
    Pending,
    /// Handed to a worker in the current wave
    Running,
    /// Apply finished without error
    Succeeded,
    /// Apply failed, or a parent failed
    Failed(ResourceError),
}

impl NodeState {
    /// Whether the node has finished, successfully or not
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed(_))
    }

    /// Check if the node failed
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Check if the node succeeded
    pub fn is_succeeded(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    /// Error of a failed node
    pub fn error(&self) -> Option<&ResourceError> {
        match self {
            Self::Failed(error) => Some(error),
            _ => None,
        }
    }
}

/// Execution-time wrapper around one resource
#[derive(Debug)]
pub struct Node {
    resource: Resource,
    parents: Vec<usize>,
    state: NodeState,
}

impl Node {
    /// The wrapped resource
    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    /// Resource name
    pub fn name(&self) -> &str {
        &self.resource.name
    }

    /// Indices of direct parents within the owning graph
    pub fn parents(&self) -> &[usize] {
        &self.parents
    }

    /// Current lifecycle state
    pub fn state(&self) -> &NodeState {
        &self.state
    }

    /// Error of a failed node
    pub fn error(&self) -> Option<&ResourceError> {
        self.state.error()
    }

    /// Pending → Running
    pub(crate) fn start(&mut self) {
        debug_assert!(matches!(self.state, NodeState::Pending));
        self.state = NodeState::Running;
    }

    /// Running → Succeeded | Failed
    pub(crate) fn finish(&mut self, outcome: Result<(), ResourceError>) {
        debug_assert!(matches!(self.state, NodeState::Running));
        self.state = match outcome {
            Ok(()) => NodeState::Succeeded,
            Err(error) => NodeState::Failed(error),
        };
    }
}

/// Validated dependency graph over a resource set
#[derive(Debug, Default)]
pub struct Graph {
    nodes: Vec<Node>,
}

impl Graph {
    /// Build and validate the graph for a list of resources
    ///
    /// Fails on the first duplicate name, undeclared dependency or cycle.
    /// Nodes keep declaration order.
    pub fn build(resources: &[Resource]) -> Result<Self, GraphError> {
        let mut index: HashMap<&str, usize> = HashMap::with_capacity(resources.len());
        for (i, resource) in resources.iter().enumerate() {
            if index.insert(resource.name.as_str(), i).is_some() {
                return Err(GraphError::DuplicateResource(resource.name.clone()));
            }
        }

        check_dependencies(resources, &index)?;

        let nodes = resources
            .iter()
            .map(|resource| Node {
                parents: resource
                    .dependencies
                    .iter()
                    .map(|dep| index[dep.as_str()])
                    .collect(),
                resource: resource.clone(),
                state: NodeState::Pending,
            })
            .collect();

        Ok(Self { nodes })
    }

    /// All nodes in declaration order
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub(crate) fn nodes_mut(&mut self) -> &mut [Node] {
        &mut self.nodes
    }

    /// Find a node by resource name
    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.name() == name)
    }

    /// Direct parents of the node at `index`
    pub fn parents_of(&self, index: usize) -> impl Iterator<Item = &Node> {
        self.nodes[index].parents.iter().map(|&p| &self.nodes[p])
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if the graph has no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether every node has reached a terminal state
    pub fn is_complete(&self) -> bool {
        self.nodes.iter().all(|n| n.state.is_terminal())
    }

    /// Failed nodes and their errors, in declaration order
    pub fn failures(&self) -> impl Iterator<Item = (&str, &ResourceError)> {
        self.nodes
            .iter()
            .filter_map(|n| n.error().map(|e| (n.name(), e)))
    }

    /// Consume the graph, keeping only failed nodes and their errors
    pub fn into_failures(self) -> impl Iterator<Item = (String, ResourceError)> {
        self.nodes.into_iter().filter_map(|n| match n.state {
            NodeState::Failed(error) => Some((n.resource.name, error)),
            _ => None,
        })
    }

    /// The waves a failure-free run would execute, as resource names
    ///
    /// Wave `k` holds every node whose parents all sit in earlier waves.
    pub fn waves(&self) -> Vec<Vec<&str>> {
        let mut wave_of: Vec<Option<usize>> = vec![None; self.nodes.len()];
        let mut waves = Vec::new();

        loop {
            let ready: Vec<usize> = (0..self.nodes.len())
                .filter(|&i| {
                    wave_of[i].is_none()
                        && self.nodes[i].parents.iter().all(|&p| wave_of[p].is_some())
                })
                .collect();

            if ready.is_empty() {
                break;
            }

            for &i in &ready {
                wave_of[i] = Some(waves.len());
            }
            waves.push(ready.into_iter().map(|i| self.nodes[i].name()).collect());
        }

        waves
    }
}

/// First resource name that appears a second time, in declaration order
pub(crate) fn find_duplicate(resources: &[Resource]) -> Option<&str> {
    let mut seen = HashSet::with_capacity(resources.len());
    resources
        .iter()
        .map(|r| r.name.as_str())
        .find(|name| !seen.insert(*name))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Resolved,
}

/// Depth-first walk from every resource with an explicit stack.
///
/// A dependency that is still in progress sits on the current path, so the
/// edge to it closes a cycle.
fn check_dependencies(
    resources: &[Resource],
    index: &HashMap<&str, usize>,
) -> Result<(), GraphError> {
    let mut marks: HashMap<&str, Mark> = HashMap::with_capacity(resources.len());

    for root in resources {
        if marks.contains_key(root.name.as_str()) {
            continue;
        }

        marks.insert(&root.name, Mark::InProgress);
        let mut stack: Vec<(usize, usize)> = vec![(index[root.name.as_str()], 0)];

        while let Some(top) = stack.last_mut() {
            let resource = &resources[top.0];
            let Some(dep) = resource.dependencies.get(top.1) else {
                marks.insert(&resource.name, Mark::Resolved);
                stack.pop();
                continue;
            };
            top.1 += 1;

            let Some(&dep_index) = index.get(dep.as_str()) else {
                return Err(GraphError::InvalidDependency {
                    resource: resource.name.clone(),
                    dependency: dep.clone(),
                });
            };

            match marks.get(dep.as_str()) {
                Some(Mark::InProgress) => {
                    return Err(GraphError::CircularDependency {
                        resource: resource.name.clone(),
                        dependency: dep.clone(),
                    });
                }
                Some(Mark::Resolved) => {}
                None => {
                    marks.insert(dep, Mark::InProgress);
                    stack.push((dep_index, 0));
                }
            }
        }
    }

    Ok(())
}
