use atomic_refcell::{AtomicRefCell, AtomicRefMut};
use basedrop::Shared;

use crate::processor::{Processor, ProcessorConfig};

/// Uniquely identifies a node in the processing graph.
///
/// Ids are assigned sequentially and never reused, and stay stable
/// across recompilations for as long as the node exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node_{}", self.0)
    }
}

/// The processor instance bound to a node, shared between the topology
/// on the control thread and whichever schedule generations reference
/// the node.
pub(crate) struct SharedProcessor {
    processor: Shared<AtomicRefCell<Box<dyn Processor>>>,
}

// Required because the boxed processor trait object is not `Sync`. This
// is safe because the processor is only ever borrowed by the audio
// thread, inside `ProcessNodeTask::process()`.
unsafe impl Send for SharedProcessor {}
unsafe impl Sync for SharedProcessor {}

impl Clone for SharedProcessor {
    fn clone(&self) -> Self {
        Self { processor: Shared::clone(&self.processor) }
    }
}

impl SharedProcessor {
    pub fn new(coll_handle: &basedrop::Handle, processor: Box<dyn Processor>) -> Self {
        Self { processor: Shared::new(coll_handle, AtomicRefCell::new(processor)) }
    }

    #[inline]
    pub fn borrow_mut(&self) -> AtomicRefMut<'_, Box<dyn Processor>> {
        self.processor.borrow_mut()
    }
}

/// A vertex in the processing graph: a processor instance, the port
/// shape it declared, and the current value of each of its parameters.
pub(crate) struct GraphNode {
    pub id: NodeId,
    pub config: ProcessorConfig,
    pub processor: SharedProcessor,

    /// The control thread's view of each parameter value, one per
    /// control input. Seeds the atomic parameter values of every process
    /// context compiled for this node.
    pub parameter_values: Vec<f32>,
}

impl GraphNode {
    pub fn new(id: NodeId, config: ProcessorConfig, processor: SharedProcessor) -> Self {
        let parameter_values = config.parameters().iter().map(|p| p.default_value).collect();

        Self { id, config, processor, parameter_values }
    }

    /// A short label for diagnostics, e.g. `ToneGenerator_1`.
    pub fn label(&self) -> String {
        format!("{}_{}", self.config.name(), self.id.0)
    }
}
