use crate::graph::NodeId;

/// A discrete event carried on a note event port.
///
/// This is a small closed set. New kinds (polyphonic expression, raw
/// MIDI) get new variants here rather than a trait hierarchy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NoteEvent {
    NoteOn { pitch: u8, velocity: f32 },
    NoteOff { pitch: u8 },
}

/// A bounded queue of note events flowing between nodes.
///
/// Storage is allocated once when the owning process context is
/// constructed and never grows, so pushing events on the audio thread
/// never allocates. The buffer is cleared at the start of every block.
pub struct EventBuffer {
    events: Vec<NoteEvent>,
}

impl EventBuffer {
    pub fn new(capacity: usize) -> Self {
        Self { events: Vec::with_capacity(capacity) }
    }

    /// Append an event. If the buffer is full the event is dropped and a
    /// warning is logged, because growing the buffer would allocate on
    /// the audio thread.
    #[inline]
    pub fn push(&mut self, event: NoteEvent) {
        if self.events.len() == self.events.capacity() {
            log::warn!("Note event buffer is full. Dropping event {:?}", event);
            return;
        }

        self.events.push(event);
    }

    pub fn iter(&self) -> impl Iterator<Item = &NoteEvent> {
        self.events.iter()
    }

    #[inline]
    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.events.capacity()
    }
}

/// A note event sent from the control thread, addressed to a node's
/// note event input port. Routed into the target process context by the
/// audio thread at the start of the next block.
#[derive(Debug, Clone, Copy)]
pub(crate) struct InjectedNoteEvent {
    pub node: NodeId,
    pub port_index: usize,
    pub event: NoteEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_past_capacity_drops_without_growing() {
        let mut buffer = EventBuffer::new(4);

        for pitch in 0..8 {
            buffer.push(NoteEvent::NoteOff { pitch });
        }

        assert_eq!(buffer.len(), 4);
        assert_eq!(buffer.capacity(), 4);

        // The first four events survived, the rest were dropped.
        let pitches: Vec<u8> = buffer
            .iter()
            .map(|e| match e {
                NoteEvent::NoteOff { pitch } => *pitch,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(pitches, vec![0, 1, 2, 3]);
    }

    #[test]
    fn clear_empties_but_keeps_capacity() {
        let mut buffer = EventBuffer::new(8);
        buffer.push(NoteEvent::NoteOn { pitch: 69, velocity: 0.5 });

        buffer.clear();

        assert!(buffer.is_empty());
        assert_eq!(buffer.capacity(), 8);
    }
}
