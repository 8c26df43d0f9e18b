use crate::graph::{ConnectionId, NodeId, NoteEvent, PortId};
use crate::project::ProjectUpdate;

/// A request to the engine.
///
/// Note that the engine may decide to ignore invalid requests. Failures
/// it does report come back as [`EngineEvent`]s.
///
/// [`EngineEvent`]: super::from_engine::EngineEvent
#[derive(Debug, Clone)]
pub enum EngineRequest {
    /// Modify the processing graph topology. Takes effect on the running
    /// audio path only once a `CompileProcessingGraph` request follows.
    ModifyGraph(ModifyGraphRequest),

    /// Compile the current topology and publish it to the audio thread.
    CompileProcessingGraph,

    /// Set the current value of one of a node's parameters.
    SetParameterValue { node: NodeId, parameter_index: usize, value: f32 },

    /// Deliver a note event into a node's note event input port at the
    /// start of the next audio block.
    SendNoteEvent { node: NodeId, port_index: usize, event: NoteEvent },

    /// Replace the in-memory project model with a freshly deserialized
    /// one. The previous model is kept if decoding fails.
    LoadProject { serialized: String },

    /// Apply an incremental change to the in-memory project model.
    UpdateProject(ProjectUpdate),

    /// Request a human-readable dump of the current topology.
    DumpTopology,

    /// Request a human-readable dump of the published schedule, one line
    /// per action.
    DumpSchedule,
}

#[derive(Debug, Clone)]
pub enum ModifyGraphRequest {
    AddNode(NewNodeKind),
    RemoveNode(NodeId),
    Connect { source: PortId, destination: PortId },
    Disconnect(ConnectionId),
}

/// The built-in processors the editor can request by name.
#[derive(Debug, Clone, Copy)]
pub enum NewNodeKind {
    ToneGenerator,
    Gain,
}

impl From<ModifyGraphRequest> for EngineRequest {
    fn from(m: ModifyGraphRequest) -> Self {
        EngineRequest::ModifyGraph(m)
    }
}
