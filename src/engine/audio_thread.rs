use rtrb::Consumer;
use std::fmt::Debug;

use crate::constants::MAX_BLOCK_SIZE;
use crate::graph::schedule::SharedSchedule;
use crate::graph::InjectedNoteEvent;
use crate::processors::MasterOutputBuffer;

/// The audio callback driver.
///
/// Owned by whatever registered itself with the audio device; call
/// [`process_interleaved`] once per hardware callback. Every call reads
/// the currently published schedule generation without blocking, runs
/// its actions, and copies the master output node's buffer into the
/// hardware output. It never allocates and it never takes a lock the
/// control thread can hold.
///
/// [`process_interleaved`]: EngineAudioThread::process_interleaved
pub struct EngineAudioThread {
    shared_schedule: SharedSchedule,
    master_out: MasterOutputBuffer,
    note_event_rx: Consumer<InjectedNoteEvent>,
}

impl Debug for EngineAudioThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineAudioThread").finish()
    }
}

impl EngineAudioThread {
    pub(crate) fn new(
        shared_schedule: SharedSchedule,
        master_out: MasterOutputBuffer,
        note_event_rx: Consumer<InjectedNoteEvent>,
    ) -> Self {
        Self { shared_schedule, master_out, note_event_rx }
    }

    /// Process one hardware callback into an interleaved output buffer
    /// of `out_channels` channels.
    ///
    /// Requests larger than the maximum block size are processed in
    /// chunks. If no schedule has been published yet, or the published
    /// schedule is empty, the output is silence.
    pub fn process_interleaved(&mut self, out: &mut [f32], out_channels: usize) {
        if out_channels == 0 || out.is_empty() {
            out.fill(0.0);
            return;
        }

        let total_frames = out.len() / out_channels;

        if total_frames * out_channels != out.len() {
            log::warn!(
                "The given output buffer with {} total samples is not a multiple of {} channels",
                out.len(),
                out_channels,
            );
            out[(total_frames * out_channels)..].fill(0.0);
        }

        // Keeps this generation alive for the whole callback, even if
        // the control thread publishes a new one mid-block.
        let current = self.shared_schedule.current();
        let mut schedule = current.borrow_mut();

        if schedule.is_empty() {
            while self.note_event_rx.pop().is_ok() {}
            out.fill(0.0);
            return;
        }

        let mut processed_frames = 0;
        while processed_frames < total_frames {
            let frames = (total_frames - processed_frames).min(MAX_BLOCK_SIZE);

            schedule.process_block(frames, &mut self.note_event_rx);

            let master = self.master_out.borrow();
            let out_part = &mut out[(processed_frames * out_channels)
                ..((processed_frames + frames) * out_channels)];

            for channel in 0..out_channels {
                if channel < master.num_channels() {
                    let buffer = master.channel(channel, frames);
                    for i in 0..frames {
                        out_part[(i * out_channels) + channel] = buffer[i];
                    }
                } else {
                    for i in 0..frames {
                        out_part[(i * out_channels) + channel] = 0.0;
                    }
                }
            }

            processed_frames += frames;
        }
    }
}
