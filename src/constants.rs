use std::time::Duration;

/// The maximum number of frames the engine will ever process in a single
/// block. Every audio and control buffer in a process context is allocated
/// to this capacity once and never resized.
pub const MAX_BLOCK_SIZE: usize = 1024;

/// The number of channels in every audio port buffer.
pub const NUM_AUDIO_CHANNELS: usize = 2;

/// The capacity of each note event buffer. Storage is allocated when the
/// process context is constructed. Events pushed past this capacity are
/// dropped.
pub const EVENT_BUFFER_CAPACITY: usize = 1024;

/// The capacity of the control thread to audio thread note event
/// injection queue.
pub(crate) const NOTE_EVENT_QUEUE_CAPACITY: usize = 256;

/// How often the garbage collector thread frees retired schedule
/// generations.
pub(crate) const GARBAGE_COLLECT_INTERVAL: Duration = Duration::from_millis(100);
