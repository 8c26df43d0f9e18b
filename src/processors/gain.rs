use crate::graph::{DataKind, ProcessContext};
use crate::processor::{ParameterConfig, PortConfig, Processor, ProcessorConfig};

/// Parameter index of the gain control input.
pub const GAIN_AMOUNT: usize = 0;

/// Scales its audio input by a smoothed gain control input.
pub struct GainProcessor {
    config: ProcessorConfig,
}

impl GainProcessor {
    pub fn new() -> Self {
        let mut config = ProcessorConfig::new("Gain");

        config.add_audio_input(PortConfig::new(DataKind::Audio, 0));
        config.add_audio_output(PortConfig::new(DataKind::Audio, 0));

        config.add_control_input(
            PortConfig::new(DataKind::Control, 0),
            ParameterConfig::new(0, 1.0, 0.0, 2.0),
        );

        Self { config }
    }
}

impl Default for GainProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl Processor for GainProcessor {
    fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    fn process(&mut self, context: &ProcessContext, frames: usize) {
        let input = context.audio_input(0);
        let gain_buffer = context.control_input(GAIN_AMOUNT);
        let gains = gain_buffer.mono(frames);

        let mut output = context.audio_output(0);

        let channels = input.num_channels().min(output.num_channels());
        for channel in 0..channels {
            let input_samples = input.channel(channel, frames);
            let output_samples = output.channel_mut(channel, frames);

            for sample_i in 0..frames {
                output_samples[sample_i] = input_samples[sample_i] * gains[sample_i];
            }
        }
    }
}
