use atomic_refcell::AtomicRefCell;
use basedrop::{Shared, SharedCell};
use fnv::FnvHashMap;
use rtrb::Consumer;

use crate::graph::context::ProcessContext;
use crate::graph::event::InjectedNoteEvent;
use crate::graph::NodeId;

pub(crate) mod task;

use task::{ProcInfo, Task};

/// One compiled generation of the processing graph: an ordered action
/// list plus the process contexts it executes against.
///
/// A schedule is immutable after it is published. The audio thread is
/// the only thing that runs it, and the garbage collector frees it once
/// a newer generation has replaced it and the audio thread has moved on.
pub(crate) struct Schedule {
    tasks: Vec<Task>,

    /// The context of every node in this generation, keyed by node id so
    /// injected note events can be routed.
    contexts: FnvHashMap<NodeId, Shared<ProcessContext>>,

    generation: u64,
    sample_rate_recip: f64,
}

impl Schedule {
    pub fn empty(sample_rate: f64) -> Self {
        Self {
            tasks: Vec::new(),
            contexts: FnvHashMap::default(),
            generation: 0,
            sample_rate_recip: 1.0 / sample_rate,
        }
    }

    pub fn new(
        tasks: Vec<Task>,
        contexts: FnvHashMap<NodeId, Shared<ProcessContext>>,
        generation: u64,
        sample_rate: f64,
    ) -> Self {
        Self { tasks, contexts, generation, sample_rate_recip: 1.0 / sample_rate }
    }

    pub fn contexts(&self) -> &FnvHashMap<NodeId, Shared<ProcessContext>> {
        &self.contexts
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Run every task in order over one block of `frames` samples.
    ///
    /// Note event buffers are cleared first, then events injected by the
    /// control thread are routed into their target contexts so they are
    /// visible to this block's process tasks.
    pub fn process_block(&mut self, frames: usize, injected: &mut Consumer<InjectedNoteEvent>) {
        for context in self.contexts.values() {
            context.clear_event_buffers();
        }

        while let Ok(injected_event) = injected.pop() {
            match self.contexts.get(&injected_event.node) {
                Some(context)
                    if injected_event.port_index < context.num_note_event_inputs() =>
                {
                    context
                        .note_event_input_mut(injected_event.port_index)
                        .push(injected_event.event);
                }
                _ => {
                    log::debug!(
                        "Dropping note event addressed to {} port {}, which is not in the current schedule",
                        injected_event.node,
                        injected_event.port_index,
                    );
                }
            }
        }

        let proc_info = ProcInfo { frames, sample_rate_recip: self.sample_rate_recip };

        for task in self.tasks.iter_mut() {
            task.process(&proc_info);
        }
    }
}

impl std::fmt::Debug for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = String::new();

        s.push_str(&format!("Schedule (generation {}) {{\n", self.generation));

        for task in self.tasks.iter() {
            s.push_str(&format!("    {:?},\n", task));
        }

        s.push('}');

        write!(f, "{}", s)
    }
}

/// A handle to the currently published schedule, shared between the
/// control thread and the audio thread.
///
/// Publishing a new generation is a single atomic pointer swap through
/// `basedrop::SharedCell`. The audio thread grabs the current generation
/// once per callback and never blocks; the previous generation stays
/// alive until the audio thread has dropped its reference, after which
/// the collector frees it off the audio thread.
pub(crate) struct SharedSchedule {
    schedule: Shared<SharedCell<AtomicRefCell<Schedule>>>,
    coll_handle: basedrop::Handle,
}

impl std::fmt::Debug for SharedSchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SharedSchedule")
    }
}

impl SharedSchedule {
    /// Returns the control thread half and the audio thread half.
    pub fn new(schedule: Schedule, coll_handle: &basedrop::Handle) -> (Self, Self) {
        let schedule = Shared::new(
            coll_handle,
            SharedCell::new(Shared::new(coll_handle, AtomicRefCell::new(schedule))),
        );

        (
            Self { schedule: Shared::clone(&schedule), coll_handle: coll_handle.clone() },
            Self { schedule, coll_handle: coll_handle.clone() },
        )
    }

    /// Publish a new generation. Control thread only.
    pub fn set(&self, schedule: Schedule) {
        self.schedule.set(Shared::new(&self.coll_handle, AtomicRefCell::new(schedule)));
    }

    /// Grab the currently published generation. Audio thread only; the
    /// returned handle keeps the generation alive for the duration of
    /// the callback.
    pub fn current(&self) -> Shared<AtomicRefCell<Schedule>> {
        self.schedule.get()
    }
}
