//! Write-through replication countdown
//!
//! With N frame slots in flight, a CPU-side change has to be copied into all
//! N GPU buffer copies before the data is consistent again. The countdown
//! tracks how many more slots still hold the stale version.

/// Remaining frame slots that still need a re-upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicationCountdown {
    frames: usize,
    remaining: usize,
}

impl ReplicationCountdown {
    /// Clean countdown for a ring of `frames` slots
    pub const fn new(frames: usize) -> Self {
        Self { frames, remaining: 0 }
    }

    /// Record a change; every slot needs the new data again
    ///
    /// Restarts at N rather than adding to what is left.
    pub fn mark(&mut self) {
        self.remaining = self.frames;
    }

    /// Take one upload; returns false once every slot is current
    pub fn consume(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }

    /// Slots still holding stale data
    pub const fn remaining(&self) -> usize {
        self.remaining
    }

    /// Number of slots being replicated into
    pub const fn frames(&self) -> usize {
        self.frames
    }

    /// Whether every slot holds the current data
    pub const fn is_clean(&self) -> bool {
        self.remaining == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_down_to_clean() {
        let mut countdown = ReplicationCountdown::new(3);
        assert!(countdown.is_clean());

        countdown.mark();
        assert!(countdown.consume());
        assert!(countdown.consume());
        assert!(countdown.consume());
        assert!(!countdown.consume());
        assert!(countdown.is_clean());
    }

    #[test]
    fn test_mark_restarts_instead_of_adding() {
        let mut countdown = ReplicationCountdown::new(3);
        countdown.mark();
        countdown.consume();
        countdown.consume();
        countdown.mark();
        assert_eq!(countdown.remaining(), 3);
        countdown.mark();
        assert_eq!(countdown.remaining(), 3);
    }
}
