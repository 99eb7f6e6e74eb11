//! Frame slot rotation.

use vkframe_rhi::sync::MAX_FRAMES_IN_FLIGHT;

/// Tracks which frame slot the next frame records into.
#[derive(Debug, Clone)]
pub struct FrameCursor {
    slot: usize,
    frames: u64,
}

impl FrameCursor {
    pub fn new() -> Self {
        Self { slot: 0, frames: 0 }
    }

    #[inline]
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Frames submitted so far.
    #[inline]
    pub fn submitted(&self) -> u64 {
        self.frames
    }

    /// Whether `slot` has carried a submission before, so its timestamp
    /// queries hold results.
    #[inline]
    pub fn has_submitted(&self, slot: usize) -> bool {
        self.frames > slot as u64
    }

    /// Moves to the next slot after a submission.
    pub fn advance(&mut self) {
        self.slot = (self.slot + 1) % MAX_FRAMES_IN_FLIGHT;
        self.frames += 1;
    }
}

impl Default for FrameCursor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_wrap_at_frames_in_flight() {
        let mut cursor = FrameCursor::new();
        let slots: Vec<usize> = (0..5)
            .map(|_| {
                let slot = cursor.slot();
                cursor.advance();
                slot
            })
            .collect();
        assert_eq!(slots, [0, 1, 0, 1, 0]);
        assert_eq!(cursor.submitted(), 5);
    }

    #[test]
    fn slots_report_first_submission() {
        let mut cursor = FrameCursor::new();
        assert!(!cursor.has_submitted(0));
        cursor.advance();
        assert!(cursor.has_submitted(0));
        assert!(!cursor.has_submitted(1));
        cursor.advance();
        assert!(cursor.has_submitted(1));
    }
}
