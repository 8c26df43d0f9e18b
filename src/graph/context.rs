use atomic_refcell::{AtomicRef, AtomicRefCell, AtomicRefMut};
use smallvec::SmallVec;

use crate::constants::{EVENT_BUFFER_CAPACITY, NUM_AUDIO_CHANNELS};
use crate::graph::buffer::AudioBuffer;
use crate::graph::event::EventBuffer;
use crate::graph::smoother::LinearParameterSmoother;
use crate::graph::NodeId;
use crate::processor::ProcessorConfig;
use crate::utils::atomic_float::AtomicF32;

/// The runtime state of one node within one compiled generation.
///
/// Owns a buffer per port, sized from the node's declared port
/// configuration: a stereo audio buffer per audio port, a mono control
/// buffer per control port and a bounded event buffer per note event
/// port. Parameter values are independently-atomic scalars written by
/// the control thread and read by the audio thread; their smoothers are
/// advanced only on the audio thread.
///
/// A context is constructed when its node is compiled into a schedule
/// generation, is owned exclusively by that generation, and is freed by
/// the garbage collector once the generation is retired.
pub struct ProcessContext {
    node: NodeId,

    audio_inputs: SmallVec<[AtomicRefCell<AudioBuffer>; 2]>,
    audio_outputs: SmallVec<[AtomicRefCell<AudioBuffer>; 2]>,

    control_inputs: SmallVec<[AtomicRefCell<AudioBuffer>; 4]>,
    control_outputs: SmallVec<[AtomicRefCell<AudioBuffer>; 4]>,

    note_event_inputs: SmallVec<[AtomicRefCell<EventBuffer>; 2]>,
    note_event_outputs: SmallVec<[AtomicRefCell<EventBuffer>; 2]>,

    parameter_values: Vec<AtomicF32>,
    smoothers: AtomicRefCell<Vec<LinearParameterSmoother>>,
}

impl ProcessContext {
    /// Construct a context sized from `config`, with parameters seeded
    /// from the node's current values.
    ///
    /// # Panics
    ///
    /// Panics if `initial_parameter_values` disagrees with the number of
    /// control inputs in `config`. A processor whose parameter list does
    /// not match its control input list is a programming error, not a
    /// recoverable condition.
    pub(crate) fn new(
        node: NodeId,
        config: &ProcessorConfig,
        initial_parameter_values: &[f32],
    ) -> Self {
        assert_eq!(
            config.num_control_inputs(),
            config.parameters().len(),
            "node {} declares {} control inputs but {} parameters",
            node,
            config.num_control_inputs(),
            config.parameters().len(),
        );
        assert_eq!(
            initial_parameter_values.len(),
            config.parameters().len(),
            "node {} was given {} parameter values for {} parameters",
            node,
            initial_parameter_values.len(),
            config.parameters().len(),
        );

        let audio_buffers = |count: usize| {
            (0..count).map(|_| AtomicRefCell::new(AudioBuffer::new(NUM_AUDIO_CHANNELS))).collect()
        };
        let control_buffers = |count: usize| {
            (0..count).map(|_| AtomicRefCell::new(AudioBuffer::new(1))).collect()
        };
        let event_buffers = |count: usize| {
            (0..count)
                .map(|_| AtomicRefCell::new(EventBuffer::new(EVENT_BUFFER_CAPACITY)))
                .collect()
        };

        let parameter_values =
            initial_parameter_values.iter().map(|v| AtomicF32::new(*v)).collect();

        let smoothers = config
            .parameters()
            .iter()
            .zip(initial_parameter_values)
            .map(|(p, v)| LinearParameterSmoother::new(*v, p.smoothing_duration_seconds))
            .collect();

        Self {
            node,
            audio_inputs: audio_buffers(config.num_audio_inputs()),
            audio_outputs: audio_buffers(config.num_audio_outputs()),
            control_inputs: control_buffers(config.num_control_inputs()),
            control_outputs: control_buffers(config.num_control_outputs()),
            note_event_inputs: event_buffers(config.num_note_event_inputs()),
            note_event_outputs: event_buffers(config.num_note_event_outputs()),
            parameter_values,
            smoothers: AtomicRefCell::new(smoothers),
        }
    }

    /// Carry the live ramp position of each smoother over from the
    /// retiring generation's context, so recompiling does not audibly
    /// jump parameters that were mid-ramp.
    pub(crate) fn seed_smoothers_from(&mut self, previous: &ProcessContext) {
        let mut smoothers = self.smoothers.borrow_mut();
        let previous_smoothers = previous.smoothers.borrow();

        for (smoother, prev) in smoothers.iter_mut().zip(previous_smoothers.iter()) {
            smoother.reset_to(prev.current_value());
        }
    }

    #[inline]
    pub fn node_id(&self) -> NodeId {
        self.node
    }

    /// Store a new parameter value. Lock-free.
    ///
    /// Must only be called from the control thread. The audio thread
    /// observes the value at its next block through the write-parameters
    /// action.
    pub fn set_parameter_value(&self, index: usize, value: f32) {
        self.parameter_values[index].store(value);
    }

    /// Load a parameter value. Lock-free, callable from either thread.
    pub fn get_parameter_value(&self, index: usize) -> f32 {
        self.parameter_values[index].load()
    }

    pub fn num_parameters(&self) -> usize {
        self.parameter_values.len()
    }

    pub fn audio_input(&self, index: usize) -> AtomicRef<'_, AudioBuffer> {
        self.audio_inputs[index].borrow()
    }

    pub(crate) fn audio_input_mut(&self, index: usize) -> AtomicRefMut<'_, AudioBuffer> {
        self.audio_inputs[index].borrow_mut()
    }

    pub fn audio_output(&self, index: usize) -> AtomicRefMut<'_, AudioBuffer> {
        self.audio_outputs[index].borrow_mut()
    }

    pub(crate) fn audio_output_ref(&self, index: usize) -> AtomicRef<'_, AudioBuffer> {
        self.audio_outputs[index].borrow()
    }

    pub fn control_input(&self, index: usize) -> AtomicRef<'_, AudioBuffer> {
        self.control_inputs[index].borrow()
    }

    pub(crate) fn control_input_mut(&self, index: usize) -> AtomicRefMut<'_, AudioBuffer> {
        self.control_inputs[index].borrow_mut()
    }

    pub fn control_output(&self, index: usize) -> AtomicRefMut<'_, AudioBuffer> {
        self.control_outputs[index].borrow_mut()
    }

    pub(crate) fn control_output_ref(&self, index: usize) -> AtomicRef<'_, AudioBuffer> {
        self.control_outputs[index].borrow()
    }

    pub fn note_event_input(&self, index: usize) -> AtomicRef<'_, EventBuffer> {
        self.note_event_inputs[index].borrow()
    }

    pub(crate) fn note_event_input_mut(&self, index: usize) -> AtomicRefMut<'_, EventBuffer> {
        self.note_event_inputs[index].borrow_mut()
    }

    pub fn note_event_output(&self, index: usize) -> AtomicRefMut<'_, EventBuffer> {
        self.note_event_outputs[index].borrow_mut()
    }

    pub(crate) fn note_event_output_ref(&self, index: usize) -> AtomicRef<'_, EventBuffer> {
        self.note_event_outputs[index].borrow()
    }

    pub fn num_audio_inputs(&self) -> usize {
        self.audio_inputs.len()
    }

    pub fn num_audio_outputs(&self) -> usize {
        self.audio_outputs.len()
    }

    pub fn num_control_inputs(&self) -> usize {
        self.control_inputs.len()
    }

    pub fn num_control_outputs(&self) -> usize {
        self.control_outputs.len()
    }

    pub fn num_note_event_inputs(&self) -> usize {
        self.note_event_inputs.len()
    }

    pub fn num_note_event_outputs(&self) -> usize {
        self.note_event_outputs.len()
    }

    pub(crate) fn smoothers(&self) -> &AtomicRefCell<Vec<LinearParameterSmoother>> {
        &self.smoothers
    }

    /// Clear every note event buffer on this context. Called by the
    /// schedule at the start of each block.
    pub(crate) fn clear_event_buffers(&self) {
        for buffer in self.note_event_inputs.iter() {
            buffer.borrow_mut().clear();
        }
        for buffer in self.note_event_outputs.iter() {
            buffer.borrow_mut().clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::DataKind;
    use crate::processor::{ParameterConfig, PortConfig};

    fn test_config() -> ProcessorConfig {
        let mut config = ProcessorConfig::new("Test");
        config.add_audio_output(PortConfig::new(DataKind::Audio, 0));
        config.add_control_input(
            PortConfig::new(DataKind::Control, 0),
            ParameterConfig::new(0, 440.0, 0.0, 20_000.0),
        );
        config.add_note_event_input(PortConfig::new(DataKind::NoteEvent, 0));
        config
    }

    #[test]
    fn buffers_are_sized_from_the_port_config() {
        let config = test_config();
        let context = ProcessContext::new(NodeId(1), &config, &[440.0]);

        assert_eq!(context.num_audio_inputs(), 0);
        assert_eq!(context.num_audio_outputs(), 1);
        assert_eq!(context.num_control_inputs(), 1);
        assert_eq!(context.num_note_event_inputs(), 1);
        assert_eq!(context.audio_output(0).num_channels(), NUM_AUDIO_CHANNELS);
        assert_eq!(context.control_input(0).num_channels(), 1);
        assert_eq!(context.note_event_input(0).capacity(), EVENT_BUFFER_CAPACITY);
    }

    #[test]
    fn parameter_values_round_trip() {
        let config = test_config();
        let context = ProcessContext::new(NodeId(1), &config, &[440.0]);

        assert_eq!(context.get_parameter_value(0), 440.0);

        context.set_parameter_value(0, 880.0);
        assert_eq!(context.get_parameter_value(0), 880.0);
    }

    #[test]
    #[should_panic]
    fn mismatched_parameter_count_is_fatal() {
        let config = test_config();
        let _ = ProcessContext::new(NodeId(1), &config, &[440.0, 0.125]);
    }
}
