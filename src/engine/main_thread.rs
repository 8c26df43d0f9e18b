use basedrop::Shared;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use fnv::FnvHashMap;
use rtrb::{Producer, RingBuffer};
use std::error::Error;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use crate::constants::{GARBAGE_COLLECT_INTERVAL, NOTE_EVENT_QUEUE_CAPACITY};
use crate::engine::audio_thread::EngineAudioThread;
use crate::engine::events::from_engine::EngineEvent;
use crate::engine::events::to_engine::{EngineRequest, ModifyGraphRequest, NewNodeKind};
use crate::garbage_collector::GarbageCollector;
use crate::graph::compiler::compile_graph;
use crate::graph::schedule::{Schedule, SharedSchedule};
use crate::graph::{
    CompileError, ConnectionId, InjectedNoteEvent, NodeId, NoteEvent, PortId, ProcessContext,
    ProcessingGraph, TopologyError,
};
use crate::processor::Processor;
use crate::processors::{GainProcessor, MasterOutputProcessor, ToneGeneratorProcessor};
use crate::project::{Project, ProjectDecodeError, ProjectUpdate, ProjectUpdateError};

#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub sample_rate: f64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self { sample_rate: 44_100.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterError {
    NodeNotFound(NodeId),
    ParameterOutOfRange { node: NodeId, index: usize },
}

impl Error for ParameterError {}

impl std::fmt::Display for ParameterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParameterError::NodeNotFound(node) => {
                write!(f, "node not found in the current topology: {}", node)
            }
            ParameterError::ParameterOutOfRange { node, index } => {
                write!(f, "{} has no parameter with index {}", node, index)
            }
        }
    }
}

#[derive(Debug)]
pub enum ProjectUpdateFailure {
    NoProjectLoaded,
    Model(ProjectUpdateError),
}

impl Error for ProjectUpdateFailure {}

impl std::fmt::Display for ProjectUpdateFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectUpdateFailure::NoProjectLoaded => {
                write!(f, "no project model has been loaded")
            }
            ProjectUpdateFailure::Model(e) => write!(f, "{}", e),
        }
    }
}

/// The engine context that lives on the control thread.
///
/// Owns the topology, the project model, and the publishing side of the
/// schedule. Every operation here is synchronous and returns a result;
/// none of them ever blocks the audio thread, which only observes the
/// atomically published schedule and the atomic parameter values.
///
/// Constructed explicitly and handed to whoever drives it, either
/// directly or through [`EngineHandle`], which runs it on a dedicated
/// thread.
///
/// [`EngineHandle`]: super::EngineHandle
pub struct EngineMainThread {
    graph: ProcessingGraph,
    shared_schedule: SharedSchedule,

    /// The process contexts of the currently published generation, used
    /// to forward parameter writes to the running schedule and to seed
    /// smoother state into the next generation.
    contexts: FnvHashMap<NodeId, Shared<ProcessContext>>,

    master_output_node: NodeId,

    note_event_tx: Producer<InjectedNoteEvent>,

    project: Option<Project>,

    generation: u64,
    sample_rate: f64,

    last_schedule_dump: String,

    coll_handle: basedrop::Handle,
    _garbage_collector: GarbageCollector,
}

impl EngineMainThread {
    /// Create the engine and its audio thread counterpart. Send the
    /// [`EngineAudioThread`] to your realtime audio thread.
    ///
    /// The master output node is created here and an initial schedule
    /// containing it is compiled and published, so the audio thread has
    /// something to run from its very first callback.
    pub fn new(settings: EngineSettings) -> (Self, EngineAudioThread) {
        let garbage_collector = GarbageCollector::new(GARBAGE_COLLECT_INTERVAL);
        let coll_handle = garbage_collector.handle();

        let mut graph = ProcessingGraph::new(coll_handle.clone());

        let (master_processor, master_buffer) = MasterOutputProcessor::new(&coll_handle);
        let master_output_node = graph.add_node(Box::new(master_processor));

        let (shared_schedule, shared_schedule_audio) =
            SharedSchedule::new(Schedule::empty(settings.sample_rate), &coll_handle);

        let (note_event_tx, note_event_rx) =
            RingBuffer::<InjectedNoteEvent>::new(NOTE_EVENT_QUEUE_CAPACITY);

        let audio_thread =
            EngineAudioThread::new(shared_schedule_audio, master_buffer, note_event_rx);

        let mut engine = Self {
            graph,
            shared_schedule,
            contexts: FnvHashMap::default(),
            master_output_node,
            note_event_tx,
            project: None,
            generation: 0,
            sample_rate: settings.sample_rate,
            last_schedule_dump: String::new(),
            coll_handle,
            _garbage_collector: garbage_collector,
        };

        if let Err(e) = engine.compile_processing_graph() {
            log::error!("Failed to compile the initial processing graph: {}", e);
        }

        (engine, audio_thread)
    }

    pub fn master_output_node_id(&self) -> NodeId {
        self.master_output_node
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Add a node bound to the given processor. The new node is not part
    /// of the running audio path until the next compile.
    pub fn add_node(&mut self, mut processor: Box<dyn Processor>) -> NodeId {
        processor.activate(self.sample_rate);
        self.graph.add_node(processor)
    }

    pub fn remove_node(&mut self, node: NodeId) -> Result<(), TopologyError> {
        if node == self.master_output_node {
            return Err(TopologyError::CannotRemoveMasterOutput);
        }

        self.graph.remove_node(node)
    }

    pub fn connect(
        &mut self,
        source: PortId,
        destination: PortId,
    ) -> Result<ConnectionId, TopologyError> {
        self.graph.connect(source, destination)
    }

    pub fn disconnect(&mut self, connection: ConnectionId) -> Result<(), TopologyError> {
        self.graph.disconnect(connection)
    }

    /// Compile the current topology into a new schedule generation and
    /// publish it to the audio thread.
    ///
    /// On failure the previously published generation stays active; a
    /// failed compile never tears down a working audio path.
    pub fn compile_processing_graph(&mut self) -> Result<u64, CompileError> {
        let schedule = compile_graph(
            &self.graph,
            &self.contexts,
            self.generation + 1,
            self.sample_rate,
            &self.coll_handle,
        )?;

        self.generation += 1;
        self.contexts = schedule.contexts().clone();
        self.last_schedule_dump = format!("{:?}", schedule);

        self.shared_schedule.set(schedule);

        log::debug!("Compiled and published processing graph generation {}", self.generation);

        Ok(self.generation)
    }

    /// Set the current value of one of a node's parameters.
    ///
    /// The value is stored on the node and, if the node is part of the
    /// published generation, forwarded to its process context with a
    /// lock-free atomic store. The audio thread picks it up at the start
    /// of its next block and smooths toward it.
    pub fn set_parameter_value(
        &mut self,
        node: NodeId,
        parameter_index: usize,
        value: f32,
    ) -> Result<(), ParameterError> {
        let graph_node =
            self.graph.node_mut(node).ok_or(ParameterError::NodeNotFound(node))?;

        if parameter_index >= graph_node.parameter_values.len() {
            return Err(ParameterError::ParameterOutOfRange { node, index: parameter_index });
        }

        graph_node.parameter_values[parameter_index] = value;

        if let Some(context) = self.contexts.get(&node) {
            context.set_parameter_value(parameter_index, value);
        }

        Ok(())
    }

    /// Queue a note event for delivery into a node's note event input
    /// port at the start of the next audio block.
    pub fn send_note_event(
        &mut self,
        node: NodeId,
        port_index: usize,
        event: NoteEvent,
    ) -> Result<(), TopologyError> {
        let graph_node = self.graph.node(node).ok_or(TopologyError::NodeNotFound(node))?;

        if port_index >= graph_node.config.num_note_event_inputs() {
            return Err(TopologyError::PortNotFound(PortId::note_in(node, port_index)));
        }

        if self.note_event_tx.push(InjectedNoteEvent { node, port_index, event }).is_err() {
            log::warn!("Note event queue is full. Dropping event {:?}", event);
        }

        Ok(())
    }

    /// Replace the project model with a freshly decoded one. On a decode
    /// error the previous project stays loaded and the running audio
    /// path is untouched.
    pub fn load_project(&mut self, serialized: &str) -> Result<u64, ProjectDecodeError> {
        let project = Project::from_json(serialized)?;
        let id = project.id;

        self.project = Some(project);

        Ok(id)
    }

    pub fn project(&self) -> Option<&Project> {
        self.project.as_ref()
    }

    /// Apply an incremental change to the project model. Changes that
    /// affect the graph's shape are reflected into the topology here,
    /// before the next compile.
    pub fn update_project(&mut self, update: &ProjectUpdate) -> Result<(), ProjectUpdateFailure> {
        {
            let project =
                self.project.as_mut().ok_or(ProjectUpdateFailure::NoProjectLoaded)?;

            project.apply_update(update).map_err(ProjectUpdateFailure::Model)?;
        }

        if let ProjectUpdate::AddToneGenerator { track_id } = update {
            let node = self.add_node(Box::new(ToneGeneratorProcessor::new()));

            let master = self.master_output_node;
            if let Err(e) = self.connect(PortId::audio_out(node, 0), PortId::audio_in(master, 0))
            {
                log::error!("Failed to connect new tone generator to the master output: {}", e);
            }

            if let Some(track) =
                self.project.as_mut().and_then(|p| p.track_mut(*track_id))
            {
                track.generator_node = Some(node.0);
            }
        }

        Ok(())
    }

    /// A human-readable dump of the current topology.
    pub fn dump_topology(&self) -> String {
        self.graph.dump()
    }

    /// A human-readable dump of the most recently compiled schedule, one
    /// line per action, naming each action's node.
    pub fn dump_schedule(&self) -> String {
        self.last_schedule_dump.clone()
    }

    /// Drive the engine from a request channel until `run` clears or the
    /// channel disconnects. This is what [`EngineHandle`] spawns.
    ///
    /// [`EngineHandle`]: super::EngineHandle
    pub fn run(
        mut self,
        requests: Receiver<EngineRequest>,
        events: Sender<EngineEvent>,
        run: Arc<AtomicBool>,
    ) {
        while run.load(Ordering::Relaxed) {
            match requests.recv_timeout(Duration::from_millis(10)) {
                Ok(request) => {
                    if let Some(event) = self.handle_request(request) {
                        if events.send(event).is_err() {
                            log::warn!("Engine event receiver was dropped");
                        }
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    fn handle_request(&mut self, request: EngineRequest) -> Option<EngineEvent> {
        match request {
            EngineRequest::ModifyGraph(request) => Some(self.handle_modify_graph(request)),
            EngineRequest::CompileProcessingGraph => {
                log::debug!("Compiling from editor request...");

                match self.compile_processing_graph() {
                    Ok(generation) => Some(EngineEvent::GraphCompiled { generation }),
                    Err(e) => {
                        log::error!("Error compiling processing graph: {}", e);
                        Some(EngineEvent::CompileFailed(e))
                    }
                }
            }
            EngineRequest::SetParameterValue { node, parameter_index, value } => {
                match self.set_parameter_value(node, parameter_index, value) {
                    Ok(()) => None,
                    Err(e) => {
                        log::warn!("Rejected parameter change: {}", e);
                        Some(EngineEvent::ParameterRejected { node, parameter_index })
                    }
                }
            }
            EngineRequest::SendNoteEvent { node, port_index, event } => {
                match self.send_note_event(node, port_index, event) {
                    Ok(()) => None,
                    Err(e) => {
                        log::warn!("Rejected note event: {}", e);
                        Some(EngineEvent::NoteEventRejected { node, port_index })
                    }
                }
            }
            EngineRequest::LoadProject { serialized } => {
                log::info!("Loading project model...");

                match self.load_project(&serialized) {
                    Ok(id) => {
                        log::info!("Loaded project model {}", id);
                        Some(EngineEvent::ProjectLoaded { id })
                    }
                    Err(e) => {
                        log::error!("Error during project decode: {}", e);
                        Some(EngineEvent::ProjectLoadFailed(e.to_string()))
                    }
                }
            }
            EngineRequest::UpdateProject(update) => match self.update_project(&update) {
                Ok(()) => Some(EngineEvent::ProjectUpdated),
                Err(e) => {
                    log::warn!("Rejected project update: {}", e);
                    Some(EngineEvent::ProjectUpdateFailed(e.to_string()))
                }
            },
            EngineRequest::DumpTopology => Some(EngineEvent::TopologyDump(self.dump_topology())),
            EngineRequest::DumpSchedule => Some(EngineEvent::ScheduleDump(self.dump_schedule())),
        }
    }

    fn handle_modify_graph(&mut self, request: ModifyGraphRequest) -> EngineEvent {
        match request {
            ModifyGraphRequest::AddNode(kind) => {
                let processor: Box<dyn Processor> = match kind {
                    NewNodeKind::ToneGenerator => Box::new(ToneGeneratorProcessor::new()),
                    NewNodeKind::Gain => Box::new(GainProcessor::new()),
                };

                EngineEvent::NodeAdded(self.add_node(processor))
            }
            ModifyGraphRequest::RemoveNode(node) => match self.remove_node(node) {
                Ok(()) => EngineEvent::NodeRemoved(node),
                Err(e) => EngineEvent::ModifyGraphFailed(e),
            },
            ModifyGraphRequest::Connect { source, destination } => {
                match self.connect(source, destination) {
                    Ok(id) => EngineEvent::ConnectionAdded(id),
                    Err(e) => EngineEvent::ModifyGraphFailed(e),
                }
            }
            ModifyGraphRequest::Disconnect(connection) => match self.disconnect(connection) {
                Ok(()) => EngineEvent::ConnectionRemoved(connection),
                Err(e) => EngineEvent::ModifyGraphFailed(e),
            },
        }
    }
}
