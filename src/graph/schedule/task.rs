use basedrop::Shared;

use crate::graph::context::ProcessContext;
use crate::graph::node::SharedProcessor;
use crate::graph::DataKind;

/// Per-block information handed to every task.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ProcInfo {
    pub frames: usize,
    pub sample_rate_recip: f64,
}

/// One schedulable unit of work in a compiled schedule.
///
/// The compiler emits, for every node in topological order, a
/// write-parameters task, one copy task per incoming connection, and a
/// process task. Order within the schedule is the compiler's output and
/// is never reordered at runtime.
pub(crate) enum Task {
    WriteParameters(WriteParametersTask),
    CopyConnection(CopyConnectionTask),
    ProcessNode(ProcessNodeTask),
}

impl Task {
    pub fn process(&mut self, proc_info: &ProcInfo) {
        match self {
            Task::WriteParameters(task) => task.process(proc_info),
            Task::CopyConnection(task) => task.process(proc_info),
            Task::ProcessNode(task) => task.process(proc_info),
        }
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Task::WriteParameters(task) => {
                write!(f, "WriteParametersTask({})", task.node_label)
            }
            Task::CopyConnection(task) => {
                write!(
                    f,
                    "CopyConnectionTask({} {}:{} -> {}:{} {})",
                    task.kind,
                    task.source_label,
                    task.source_index,
                    task.destination_label,
                    task.destination_index,
                    match task.mode {
                        CopyMode::Overwrite => "overwrite",
                        CopyMode::Add => "add",
                    },
                )
            }
            Task::ProcessNode(task) => write!(f, "ProcessNodeTask({})", task.node_label),
        }
    }
}

/// Pushes the node's current atomic parameter values through their
/// smoothers and writes the smoothed ramp into the node's control input
/// buffers, one value per sample.
pub(crate) struct WriteParametersTask {
    pub context: Shared<ProcessContext>,
    pub node_label: String,
}

impl WriteParametersTask {
    fn process(&mut self, proc_info: &ProcInfo) {
        let context = &*self.context;
        let dt = proc_info.sample_rate_recip as f32;

        let mut smoothers = context.smoothers().borrow_mut();

        for (index, smoother) in smoothers.iter_mut().enumerate() {
            smoother.set_target_value(context.get_parameter_value(index));

            let mut buffer = context.control_input_mut(index);
            for sample in buffer.mono_mut(proc_info.frames).iter_mut() {
                smoother.process(dt);
                *sample = smoother.current_value();
            }
        }
    }
}

/// How a copy task combines with whatever is already in the destination
/// buffer. The first copy into a destination port overwrites, any
/// further copy into the same port adds, which is how fan-in sums.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CopyMode {
    Overwrite,
    Add,
}

/// Moves one block of data across one connection, from a source port's
/// output buffer into a destination port's input buffer.
pub(crate) struct CopyConnectionTask {
    pub source: Shared<ProcessContext>,
    pub destination: Shared<ProcessContext>,
    pub kind: DataKind,
    pub source_index: usize,
    pub destination_index: usize,
    pub mode: CopyMode,
    pub source_label: String,
    pub destination_label: String,
}

impl CopyConnectionTask {
    fn process(&mut self, proc_info: &ProcInfo) {
        let frames = proc_info.frames;

        match self.kind {
            DataKind::Audio => {
                let source = self.source.audio_output_ref(self.source_index);
                let mut destination = self.destination.audio_input_mut(self.destination_index);

                let channels = source.num_channels().min(destination.num_channels());
                for channel in 0..channels {
                    let src = source.channel(channel, frames);
                    let dst = destination.channel_mut(channel, frames);

                    match self.mode {
                        CopyMode::Overwrite => dst.copy_from_slice(src),
                        CopyMode::Add => {
                            for (d, s) in dst.iter_mut().zip(src) {
                                *d += *s;
                            }
                        }
                    }
                }
            }
            DataKind::Control => {
                let source = self.source.control_output_ref(self.source_index);
                let mut destination = self.destination.control_input_mut(self.destination_index);

                let src = source.mono(frames);
                let dst = destination.mono_mut(frames);

                match self.mode {
                    CopyMode::Overwrite => dst.copy_from_slice(src),
                    CopyMode::Add => {
                        for (d, s) in dst.iter_mut().zip(src) {
                            *d += *s;
                        }
                    }
                }
            }
            DataKind::NoteEvent => {
                let source = self.source.note_event_output_ref(self.source_index);
                let mut destination =
                    self.destination.note_event_input_mut(self.destination_index);

                for event in source.iter() {
                    destination.push(*event);
                }
            }
        }
    }
}

/// Invokes the node's processor over its process context.
pub(crate) struct ProcessNodeTask {
    pub context: Shared<ProcessContext>,
    pub processor: SharedProcessor,
    pub node_label: String,
}

impl ProcessNodeTask {
    fn process(&mut self, proc_info: &ProcInfo) {
        self.processor.borrow_mut().process(&self.context, proc_info.frames);
    }
}
