use crate::graph::{DataKind, NoteEvent, ProcessContext};
use crate::processor::{ParameterConfig, PortConfig, Processor, ProcessorConfig};

/// Parameter index of the frequency control input.
pub const TONE_GENERATOR_FREQUENCY: usize = 0;
/// Parameter index of the amplitude control input.
pub const TONE_GENERATOR_AMPLITUDE: usize = 1;

/// The reference oscillator node.
///
/// One stereo audio output, smoothed frequency and amplitude control
/// inputs, and one note event input. While a note is held, the note's
/// pitch overrides the frequency parameter; a note off hands control
/// back to the parameter.
pub struct ToneGeneratorProcessor {
    config: ProcessorConfig,

    phase: f64,
    sample_rate: f64,
    note_override: Option<u8>,
}

impl ToneGeneratorProcessor {
    pub fn new() -> Self {
        let mut config = ProcessorConfig::new("ToneGenerator");

        config.add_audio_output(PortConfig::new(DataKind::Audio, 0));

        // Frequency
        config.add_control_input(
            PortConfig::new(DataKind::Control, 0),
            ParameterConfig::new(0, 440.0, 0.0, 20_000.0),
        );

        // Amplitude
        config.add_control_input(
            PortConfig::new(DataKind::Control, 1),
            ParameterConfig::new(1, 0.125, 0.0, 1.0),
        );

        config.add_note_event_input(PortConfig::new(DataKind::NoteEvent, 0));

        Self { config, phase: 0.0, sample_rate: 44_100.0, note_override: None }
    }
}

impl Default for ToneGeneratorProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor for ToneGeneratorProcessor {
    fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    fn activate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
    }

    fn process(&mut self, context: &ProcessContext, frames: usize) {
        for event in context.note_event_input(0).iter() {
            match event {
                NoteEvent::NoteOn { pitch, .. } => self.note_override = Some(*pitch),
                NoteEvent::NoteOff { .. } => self.note_override = None,
            }
        }

        let frequency_buffer = context.control_input(TONE_GENERATOR_FREQUENCY);
        let amplitude_buffer = context.control_input(TONE_GENERATOR_AMPLITUDE);
        let frequencies = frequency_buffer.mono(frames);
        let amplitudes = amplitude_buffer.mono(frames);

        let mut output = context.audio_output(0);

        for sample_i in 0..frames {
            let frequency = match self.note_override {
                Some(pitch) => 440.0 * 2.0_f32.powf((pitch as f32 - 69.0) / 12.0),
                None => frequencies[sample_i],
            };

            let value =
                amplitudes[sample_i] * (std::f32::consts::TAU * self.phase as f32).sin();

            for channel in 0..output.num_channels() {
                output.channel_mut(channel, frames)[sample_i] = value;
            }

            self.phase = (self.phase + frequency as f64 / self.sample_rate).fract();
        }
    }
}
