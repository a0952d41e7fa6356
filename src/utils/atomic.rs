//! Word-atomic scalars shared between the control and telemetry threads.
//!
//! Each value is a single 32-bit word, so a reader never observes a torn
//! float. Reads across *different* scalars are not synchronised with each other.

use std::sync::atomic::{AtomicU32, Ordering};

/// f32 stored as its bit pattern in an `AtomicU32`.
#[derive(Debug)]
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub fn new(val: f32) -> Self {
        Self(AtomicU32::new(val.to_bits()))
    }

    #[inline]
    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn store(&self, val: f32) {
        self.0.store(val.to_bits(), Ordering::Relaxed);
    }
}

impl Default for AtomicF32 {
    fn default() -> Self {
        Self::new(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_and_loads_exact_bits() {
        let a = AtomicF32::new(1.5);
        assert_eq!(a.load(), 1.5);
        a.store(-42.25);
        assert_eq!(a.load(), -42.25);
        a.store(f32::NAN);
        assert!(a.load().is_nan());
    }
}
