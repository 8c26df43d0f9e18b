//! The processing graph: topology, compiler and compiled schedules.
//!
//! The topology is the mutable, control-thread-owned description of the
//! graph. Nothing the audio thread executes points back into it; the
//! compiler turns a snapshot of it into an immutable [`Schedule`]
//! generation that is published to the audio thread with an atomic swap.
//!
//! [`Schedule`]: schedule::Schedule

use fnv::FnvHashMap;
use std::error::Error;

pub(crate) mod buffer;
pub(crate) mod compiler;
pub(crate) mod context;
pub(crate) mod event;
pub(crate) mod node;
pub(crate) mod port;
pub(crate) mod schedule;
pub(crate) mod smoother;

pub use buffer::AudioBuffer;
pub use compiler::CompileError;
pub use context::ProcessContext;
pub use event::{EventBuffer, NoteEvent};
pub use node::NodeId;
pub use port::{Connection, ConnectionId, DataKind, PortDirection, PortId};
pub use smoother::LinearParameterSmoother;

pub(crate) use event::InjectedNoteEvent;
pub(crate) use node::{GraphNode, SharedProcessor};

use crate::processor::Processor;

/// Errors returned by topology mutation calls. A failed mutation never
/// changes the topology.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TopologyError {
    /// A connection endpoint does not resolve to a port in the current
    /// topology.
    PortNotFound(PortId),

    /// The two endpoints of a connection carry different data kinds.
    TypeMismatch { source: DataKind, destination: DataKind },

    /// An identical connection already exists.
    DuplicateConnection(ConnectionId),

    /// The port exists, but cannot be used in this position of a
    /// connection. Sources must be outputs and destinations inputs.
    InvalidDirection { port: PortId, expected: PortDirection },

    ConnectionNotFound(ConnectionId),

    NodeNotFound(NodeId),

    /// The master output node is created by the engine and lives for as
    /// long as the engine does.
    CannotRemoveMasterOutput,
}

impl Error for TopologyError {}

impl std::fmt::Display for TopologyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TopologyError::PortNotFound(port) => {
                write!(f, "port not found in the current topology: {}", port)
            }
            TopologyError::TypeMismatch { source, destination } => {
                write!(f, "cannot connect a {} port to a {} port", source, destination)
            }
            TopologyError::DuplicateConnection(id) => {
                write!(f, "an identical connection already exists: {}", id)
            }
            TopologyError::InvalidDirection { port, expected } => match expected {
                PortDirection::Output => {
                    write!(f, "connection sources must be output ports, got {}", port)
                }
                PortDirection::Input => {
                    write!(f, "connection destinations must be input ports, got {}", port)
                }
            },
            TopologyError::ConnectionNotFound(id) => {
                write!(f, "connection not found in the current topology: {}", id)
            }
            TopologyError::NodeNotFound(id) => {
                write!(f, "node not found in the current topology: {}", id)
            }
            TopologyError::CannotRemoveMasterOutput => {
                write!(f, "the master output node cannot be removed")
            }
        }
    }
}

/// The mutable collection of nodes and connections.
///
/// Owned by the engine on the control thread. Mutations are observable
/// only after the call returns and never trigger recompilation on their
/// own; the running audio path does not change until the engine compiles
/// and publishes a new schedule generation.
pub(crate) struct ProcessingGraph {
    nodes: FnvHashMap<NodeId, GraphNode>,
    connections: FnvHashMap<ConnectionId, Connection>,

    next_node_id: u64,
    next_connection_id: u64,

    coll_handle: basedrop::Handle,
}

impl ProcessingGraph {
    pub fn new(coll_handle: basedrop::Handle) -> Self {
        Self {
            nodes: FnvHashMap::default(),
            connections: FnvHashMap::default(),
            next_node_id: 0,
            next_connection_id: 0,
            coll_handle,
        }
    }

    pub fn add_node(&mut self, processor: Box<dyn Processor>) -> NodeId {
        let id = NodeId(self.next_node_id);
        self.next_node_id += 1;

        let config = processor.config().clone();
        let processor = SharedProcessor::new(&self.coll_handle, processor);

        self.nodes.insert(id, GraphNode::new(id, config, processor));

        id
    }

    /// Remove a node and every connection touching it, as one mutation.
    pub fn remove_node(&mut self, id: NodeId) -> Result<(), TopologyError> {
        if self.nodes.remove(&id).is_none() {
            return Err(TopologyError::NodeNotFound(id));
        }

        self.connections
            .retain(|_, connection| {
                connection.source.node != id && connection.destination.node != id
            });

        Ok(())
    }

    pub fn connect(
        &mut self,
        source: PortId,
        destination: PortId,
    ) -> Result<ConnectionId, TopologyError> {
        if source.direction != PortDirection::Output {
            return Err(TopologyError::InvalidDirection {
                port: source,
                expected: PortDirection::Output,
            });
        }
        if destination.direction != PortDirection::Input {
            return Err(TopologyError::InvalidDirection {
                port: destination,
                expected: PortDirection::Input,
            });
        }

        if !self.port_exists(source) {
            return Err(TopologyError::PortNotFound(source));
        }
        if !self.port_exists(destination) {
            return Err(TopologyError::PortNotFound(destination));
        }

        if source.kind != destination.kind {
            return Err(TopologyError::TypeMismatch {
                source: source.kind,
                destination: destination.kind,
            });
        }

        if let Some((existing, _)) = self
            .connections
            .iter()
            .find(|(_, c)| c.source == source && c.destination == destination)
        {
            return Err(TopologyError::DuplicateConnection(*existing));
        }

        let id = ConnectionId(self.next_connection_id);
        self.next_connection_id += 1;

        self.connections.insert(id, Connection { source, destination });

        Ok(id)
    }

    pub fn disconnect(&mut self, id: ConnectionId) -> Result<(), TopologyError> {
        if self.connections.remove(&id).is_none() {
            return Err(TopologyError::ConnectionNotFound(id));
        }

        Ok(())
    }

    fn port_exists(&self, port: PortId) -> bool {
        match self.nodes.get(&port.node) {
            Some(node) => port.index < node.config.num_ports(port.kind, port.direction),
            None => false,
        }
    }

    pub fn node(&self, id: NodeId) -> Option<&GraphNode> {
        self.nodes.get(&id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut GraphNode> {
        self.nodes.get_mut(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    pub fn connections(&self) -> impl Iterator<Item = (ConnectionId, &Connection)> {
        self.connections.iter().map(|(id, connection)| (*id, connection))
    }

    /// Every connection whose destination is a port on `node`, in
    /// connection id order so callers walk them deterministically.
    pub fn connections_into(&self, node: NodeId) -> Vec<(ConnectionId, Connection)> {
        let mut incoming: Vec<(ConnectionId, Connection)> = self
            .connections
            .iter()
            .filter(|(_, c)| c.destination.node == node)
            .map(|(id, c)| (*id, *c))
            .collect();

        incoming.sort_by_key(|(id, _)| *id);

        incoming
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_connections(&self) -> usize {
        self.connections.len()
    }

    /// A human-readable dump of the topology, one node or connection per
    /// line, in id order.
    pub fn dump(&self) -> String {
        let mut s = String::from("ProcessingGraph {\n");

        let mut node_ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        node_ids.sort();

        for id in node_ids {
            let node = &self.nodes[&id];
            let c = &node.config;
            s.push_str(&format!(
                "    {}: audio {}/{}, control {}/{}, note {}/{}\n",
                node.label(),
                c.num_audio_inputs(),
                c.num_audio_outputs(),
                c.num_control_inputs(),
                c.num_control_outputs(),
                c.num_note_event_inputs(),
                c.num_note_event_outputs(),
            ));
        }

        let mut connection_ids: Vec<ConnectionId> = self.connections.keys().copied().collect();
        connection_ids.sort();

        for id in connection_ids {
            let connection = &self.connections[&id];
            s.push_str(&format!(
                "    {}: {} -> {}\n",
                id, connection.source, connection.destination,
            ));
        }

        s.push('}');

        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::{GainProcessor, ToneGeneratorProcessor};

    fn graph_with_tone_and_gain() -> (ProcessingGraph, NodeId, NodeId, basedrop::Collector) {
        let collector = basedrop::Collector::new();
        let mut graph = ProcessingGraph::new(collector.handle());

        let tone = graph.add_node(Box::new(ToneGeneratorProcessor::new()));
        let gain = graph.add_node(Box::new(GainProcessor::new()));

        (graph, tone, gain, collector)
    }

    #[test]
    fn connect_validates_endpoints() {
        let (mut graph, tone, gain, _collector) = graph_with_tone_and_gain();

        // The tone generator has no audio input port.
        let missing = PortId::audio_in(tone, 0);
        assert_eq!(
            graph.connect(PortId::audio_out(gain, 0), missing),
            Err(TopologyError::PortNotFound(missing)),
        );

        // Kind mismatch between an audio output and a control input.
        assert_eq!(
            graph.connect(PortId::audio_out(tone, 0), PortId::control_in(gain, 0)),
            Err(TopologyError::TypeMismatch {
                source: DataKind::Audio,
                destination: DataKind::Control,
            }),
        );

        // Inputs cannot be used as sources.
        assert!(matches!(
            graph.connect(PortId::audio_in(gain, 0), PortId::audio_in(gain, 0)),
            Err(TopologyError::InvalidDirection { .. }),
        ));
    }

    #[test]
    fn duplicate_connections_are_rejected() {
        let (mut graph, tone, gain, _collector) = graph_with_tone_and_gain();

        let id = graph.connect(PortId::audio_out(tone, 0), PortId::audio_in(gain, 0)).unwrap();

        assert_eq!(
            graph.connect(PortId::audio_out(tone, 0), PortId::audio_in(gain, 0)),
            Err(TopologyError::DuplicateConnection(id)),
        );

        // Still exactly one connection, and a failed connect changed nothing.
        assert_eq!(graph.num_connections(), 1);
    }

    #[test]
    fn removing_a_node_removes_incident_connections() {
        let (mut graph, tone, gain, _collector) = graph_with_tone_and_gain();

        graph.connect(PortId::audio_out(tone, 0), PortId::audio_in(gain, 0)).unwrap();
        assert_eq!(graph.num_connections(), 1);

        graph.remove_node(tone).unwrap();

        assert_eq!(graph.num_nodes(), 1);
        assert_eq!(graph.num_connections(), 0);
        assert_eq!(graph.remove_node(tone), Err(TopologyError::NodeNotFound(tone)));
    }

    #[test]
    fn node_ids_are_not_reused() {
        let (mut graph, tone, _gain, _collector) = graph_with_tone_and_gain();

        graph.remove_node(tone).unwrap();
        let replacement = graph.add_node(Box::new(ToneGeneratorProcessor::new()));

        assert_ne!(replacement, tone);
    }

    #[test]
    fn dump_names_nodes_and_connections() {
        let (mut graph, tone, gain, _collector) = graph_with_tone_and_gain();
        let id = graph.connect(PortId::audio_out(tone, 0), PortId::audio_in(gain, 0)).unwrap();

        let dump = graph.dump();

        assert!(dump.contains("ToneGenerator_0"));
        assert!(dump.contains("Gain_1"));
        assert!(dump.contains(&format!("{}", id)));
    }
}
