//! Playback handles and their allocator.

use serde::{Deserialize, Serialize};

/// Token identifying one playback issued by an [`crate::AnimationQueue`].
/// Rejected requests yield `None` instead of a handle.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct PlaybackHandle(pub u32);

/// Monotonic allocator; handles are never reused within one queue.
#[derive(Default, Debug)]
pub struct HandleAllocator {
    next: u32,
}

impl HandleAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn alloc(&mut self) -> PlaybackHandle {
        let id = PlaybackHandle(self.next);
        self.next = self.next.wrapping_add(1);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_monotonic() {
        let mut alloc = HandleAllocator::new();
        assert_eq!(alloc.alloc(), PlaybackHandle(0));
        assert_eq!(alloc.alloc(), PlaybackHandle(1));
        assert_eq!(alloc.alloc(), PlaybackHandle(2));
    }
}
