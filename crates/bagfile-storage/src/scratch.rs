//! Reusable Byte Buffers
//!
//! The write path serializes every message into one scratch buffer before
//! framing it; the read path reads every payload into another. Both buffers
//! live for the lifetime of the bag handle and grow geometrically (capacity
//! doubles until it fits), so a burst of large messages settles into a
//! steady state with no per-message allocation.
//!
//! A `Scratch` is not shared across threads; each one sits behind the same
//! mutex as the stream it feeds.

/// A reusable buffer with doubling growth
#[derive(Debug, Default)]
pub struct Scratch {
    buf: Vec<u8>,
}

impl Scratch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the buffer at least `len` bytes long and return the writable
    /// prefix of exactly that length. Existing capacity is reused; growth
    /// doubles the allocation until it fits.
    pub fn grow_to(&mut self, len: usize) -> &mut [u8] {
        if self.buf.len() < len {
            let mut new_len = if self.buf.is_empty() { len } else { self.buf.len() };
            while new_len < len {
                new_len *= 2;
            }
            self.buf.resize(new_len, 0);
        }
        &mut self.buf[..len]
    }

    /// The first `len` bytes, previously filled via [`grow_to`]
    ///
    /// [`grow_to`]: Scratch::grow_to
    pub fn filled(&self, len: usize) -> &[u8] {
        &self.buf[..len]
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_empty() {
        let scratch = Scratch::new();
        assert_eq!(scratch.capacity(), 0);
    }

    #[test]
    fn test_first_growth_is_exact() {
        let mut scratch = Scratch::new();
        scratch.grow_to(100);
        assert_eq!(scratch.capacity(), 100);
    }

    #[test]
    fn test_growth_doubles() {
        let mut scratch = Scratch::new();
        scratch.grow_to(100);
        scratch.grow_to(150);
        assert_eq!(scratch.capacity(), 200);
        scratch.grow_to(900);
        assert_eq!(scratch.capacity(), 1600);
    }

    #[test]
    fn test_smaller_request_keeps_capacity() {
        let mut scratch = Scratch::new();
        scratch.grow_to(256);
        scratch.grow_to(10);
        assert_eq!(scratch.capacity(), 256);
    }

    #[test]
    fn test_filled_returns_written_bytes() {
        let mut scratch = Scratch::new();
        scratch.grow_to(4).copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(scratch.filled(4), &[1, 2, 3, 4]);
        // A later, larger request keeps the old prefix intact
        scratch.grow_to(8);
        assert_eq!(scratch.filled(4), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_zero_length() {
        let mut scratch = Scratch::new();
        assert!(scratch.grow_to(0).is_empty());
        assert!(scratch.filled(0).is_empty());
    }
}
