use std::sync::atomic::{AtomicU32, Ordering};

/// An `f32` value that can be shared across threads with lock-free
/// stores and loads, backed by an `AtomicU32` holding the raw bits.
pub(crate) struct AtomicF32 {
    bits: AtomicU32,
}

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self { bits: AtomicU32::new(value.to_bits()) }
    }

    #[inline]
    pub fn load(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn store(&self, value: f32) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }
}

impl std::fmt::Debug for AtomicF32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.load())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_values() {
        let v = AtomicF32::new(0.125);
        assert_eq!(v.load(), 0.125);

        v.store(-440.0);
        assert_eq!(v.load(), -440.0);
    }
}
