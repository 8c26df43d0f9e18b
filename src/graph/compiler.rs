use basedrop::Shared;
use fnv::{FnvHashMap, FnvHashSet};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::error::Error;

use crate::graph::context::ProcessContext;
use crate::graph::schedule::task::{
    CopyConnectionTask, CopyMode, ProcessNodeTask, Task, WriteParametersTask,
};
use crate::graph::schedule::Schedule;
use crate::graph::{NodeId, ProcessingGraph};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// The topology contains a cycle, so no linear execution order
    /// exists. Names one node on the cycle.
    CyclicGraph { node: NodeId },

    /// The compiler hit a state that should be impossible for a valid
    /// topology. This is a bug in the graph or the compiler, not a user
    /// error.
    UnexpectedError(String),
}

impl Error for CompileError {}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileError::CyclicGraph { node } => {
                write!(f, "the processing graph contains a cycle involving {}", node)
            }
            CompileError::UnexpectedError(message) => {
                write!(f, "unexpected error while compiling the processing graph: {}", message)
            }
        }
    }
}

/// Compile a snapshot of the topology into a new schedule generation.
///
/// Runs entirely on the control thread and touches nothing the audio
/// thread can see. Every node gets a freshly constructed process
/// context; nodes that also exist in `previous_contexts` have their
/// smoothers seeded from the live generation so a recompile does not
/// audibly jump parameters mid-ramp.
///
/// Identical topology input always yields an identical task order.
pub(crate) fn compile_graph(
    graph: &ProcessingGraph,
    previous_contexts: &FnvHashMap<NodeId, Shared<ProcessContext>>,
    generation: u64,
    sample_rate: f64,
    coll_handle: &basedrop::Handle,
) -> Result<Schedule, CompileError> {
    let order = topological_order(graph)?;

    let mut contexts: FnvHashMap<NodeId, Shared<ProcessContext>> = FnvHashMap::default();
    let mut tasks: Vec<Task> =
        Vec::with_capacity(order.len() * 2 + graph.num_connections());

    for node_id in order {
        let node = graph.node(node_id).ok_or_else(|| {
            CompileError::UnexpectedError(format!(
                "the topological order refers to {} which does not exist in the topology",
                node_id
            ))
        })?;

        let mut context = ProcessContext::new(node_id, &node.config, &node.parameter_values);
        if let Some(previous) = previous_contexts.get(&node_id) {
            context.seed_smoothers_from(previous);
        }
        let context = Shared::new(coll_handle, context);
        contexts.insert(node_id, Shared::clone(&context));

        let label = node.label();

        tasks.push(Task::WriteParameters(WriteParametersTask {
            context: Shared::clone(&context),
            node_label: label.clone(),
        }));

        // Incoming connections are walked in connection id order so the
        // schedule is deterministic. The first copy into a destination
        // port overwrites whatever the buffer held, further copies into
        // the same port sum. A connected control input therefore
        // overrides the parameter ramp written just above.
        let mut seen_destination_ports: FnvHashSet<(crate::graph::DataKind, usize)> =
            FnvHashSet::default();

        for (_, connection) in graph.connections_into(node_id) {
            let source_node = graph.node(connection.source.node).ok_or_else(|| {
                CompileError::UnexpectedError(format!(
                    "connection source {} does not exist in the topology",
                    connection.source.node
                ))
            })?;
            let source_context = contexts.get(&connection.source.node).ok_or_else(|| {
                CompileError::UnexpectedError(format!(
                    "connection source {} was scheduled after its dependent {}",
                    connection.source.node, node_id
                ))
            })?;

            let mode = if seen_destination_ports
                .insert((connection.destination.kind, connection.destination.index))
            {
                CopyMode::Overwrite
            } else {
                CopyMode::Add
            };

            tasks.push(Task::CopyConnection(CopyConnectionTask {
                source: Shared::clone(source_context),
                destination: Shared::clone(&context),
                kind: connection.source.kind,
                source_index: connection.source.index,
                destination_index: connection.destination.index,
                mode,
                source_label: source_node.label(),
                destination_label: label.clone(),
            }));
        }

        tasks.push(Task::ProcessNode(ProcessNodeTask {
            context,
            processor: node.processor.clone(),
            node_label: label,
        }));
    }

    Ok(Schedule::new(tasks, contexts, generation, sample_rate))
}

/// Kahn's algorithm over the node dependency graph. Ready nodes are
/// emitted in ascending node id order so ties break deterministically.
fn topological_order(graph: &ProcessingGraph) -> Result<Vec<NodeId>, CompileError> {
    let mut in_degree: FnvHashMap<NodeId, usize> = FnvHashMap::default();
    let mut out_edges: FnvHashMap<NodeId, Vec<NodeId>> = FnvHashMap::default();

    for node in graph.nodes() {
        in_degree.insert(node.id, 0);
    }

    for (_, connection) in graph.connections() {
        if let Some(degree) = in_degree.get_mut(&connection.destination.node) {
            *degree += 1;
        }
        out_edges.entry(connection.source.node).or_default().push(connection.destination.node);
    }

    let mut ready: BinaryHeap<Reverse<NodeId>> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| Reverse(*id))
        .collect();

    let mut order = Vec::with_capacity(graph.num_nodes());

    while let Some(Reverse(node_id)) = ready.pop() {
        order.push(node_id);

        if let Some(dependents) = out_edges.get(&node_id) {
            for dependent in dependents {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push(Reverse(*dependent));
                    }
                }
            }
        }
    }

    if order.len() < graph.num_nodes() {
        // Every remaining node sits on or behind a cycle. Report the
        // smallest id so the error is deterministic too.
        return match in_degree
            .iter()
            .filter(|(_, degree)| **degree > 0)
            .map(|(id, _)| *id)
            .min()
        {
            Some(node) => Err(CompileError::CyclicGraph { node }),
            None => Err(CompileError::UnexpectedError(
                "not all nodes were scheduled, but none has unmet dependencies".into(),
            )),
        };
    }

    Ok(order)
}
