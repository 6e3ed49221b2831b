//! Bounded round-robin iteration over instance indices

/// Yields `len` indices starting at `start`, wrapping from the last index
/// back to 0, then stops.
///
/// An out-of-range `start` (a stale location hint from a larger cluster) is
/// reduced modulo `len`.
#[derive(Debug, Clone)]
pub struct CyclicIndices {
    next: usize,
    len: usize,
    remaining: usize,
}

impl CyclicIndices {
    pub fn new(start: usize, len: usize) -> Self {
        Self {
            next: if len == 0 { 0 } else { start % len },
            len,
            remaining: len,
        }
    }
}

impl Iterator for CyclicIndices {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        let current = self.next;
        self.next = (self.next + 1) % self.len;
        self.remaining -= 1;
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for CyclicIndices {}
