//! The real-time audio graph engine used in the Bluestem DAW backend.
//!
//! A control thread owns a mutable [`graph`] topology and compiles it
//! into immutable schedule generations; the audio thread executes the
//! currently published generation once per hardware callback through
//! [`EngineAudioThread`], without blocking or allocating. See
//! [`EngineMainThread`] for the control-thread surface and
//! [`EngineHandle`] for running it on its own thread.

pub mod constants;
pub mod engine;
pub mod graph;
pub mod processor;
pub mod processors;
pub mod project;

mod garbage_collector;
mod utils;

pub use engine::events::from_engine::EngineEvent;
pub use engine::events::to_engine::{EngineRequest, ModifyGraphRequest, NewNodeKind};
pub use engine::{
    EngineAudioThread, EngineHandle, EngineMainThread, EngineSettings, ParameterError,
};
pub use graph::{
    AudioBuffer, CompileError, Connection, ConnectionId, DataKind, EventBuffer,
    LinearParameterSmoother, NodeId, NoteEvent, PortDirection, PortId, ProcessContext,
    TopologyError,
};
pub use processor::{ParameterConfig, PortConfig, Processor, ProcessorConfig};
pub use processors::{GainProcessor, MasterOutputProcessor, ToneGeneratorProcessor};
pub use project::{Project, ProjectDecodeError, ProjectUpdate, ProjectUpdateError};
