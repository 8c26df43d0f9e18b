//! The built-in reference processors.

mod gain;
mod master_output;
mod tone_generator;

pub use gain::{GainProcessor, GAIN_AMOUNT};
pub use master_output::MasterOutputProcessor;
pub use tone_generator::{
    ToneGeneratorProcessor, TONE_GENERATOR_AMPLITUDE, TONE_GENERATOR_FREQUENCY,
};

pub(crate) use master_output::MasterOutputBuffer;
