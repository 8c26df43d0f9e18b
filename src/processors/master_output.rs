use atomic_refcell::AtomicRefCell;
use basedrop::Shared;

use crate::constants::NUM_AUDIO_CHANNELS;
use crate::graph::{AudioBuffer, DataKind, ProcessContext};
use crate::processor::{PortConfig, Processor, ProcessorConfig};

/// The buffer the master output node writes each block, shared with the
/// audio callback driver.
///
/// Within a block it is written only by the master node's process task
/// and read by the driver afterwards, so the borrows never overlap.
pub(crate) type MasterOutputBuffer = Shared<AtomicRefCell<AudioBuffer>>;

/// The terminal node of the graph.
///
/// Copies its audio input each block into a retrievable buffer that the
/// audio callback driver writes to the hardware. Created once at engine
/// construction; the engine keeps it alive for its whole lifetime.
pub struct MasterOutputProcessor {
    config: ProcessorConfig,
    buffer: MasterOutputBuffer,
}

impl MasterOutputProcessor {
    pub(crate) fn new(coll_handle: &basedrop::Handle) -> (Self, MasterOutputBuffer) {
        let mut config = ProcessorConfig::new("MasterOutput");
        config.add_audio_input(PortConfig::new(DataKind::Audio, 0));

        let buffer =
            Shared::new(coll_handle, AtomicRefCell::new(AudioBuffer::new(NUM_AUDIO_CHANNELS)));

        (Self { config, buffer: Shared::clone(&buffer) }, buffer)
    }
}

impl Processor for MasterOutputProcessor {
    fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    fn process(&mut self, context: &ProcessContext, frames: usize) {
        let input = context.audio_input(0);
        let mut buffer = self.buffer.borrow_mut();

        let channels = input.num_channels().min(buffer.num_channels());
        for channel in 0..channels {
            buffer.channel_mut(channel, frames).copy_from_slice(input.channel(channel, frames));
        }
    }
}
