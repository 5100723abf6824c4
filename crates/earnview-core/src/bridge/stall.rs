//! Position-based stall detection
//!
//! Some embeds report `playing` optimistically. The detector compares the
//! playback position between polls and reports a stall once, then stays
//! quiet until the position moves again.

/// Result of a single position sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StallVerdict {
    /// First sample after a reset; nothing to compare against
    Baseline,
    /// Position moved
    Advancing,
    /// Position stopped moving (reported once per stall)
    Stalled,
    /// Still stalled, already reported
    StillStalled,
    /// Position moved again after a reported stall
    Resumed,
}

#[derive(Debug, Clone)]
pub struct StallDetector {
    epsilon: f64,
    last_position: Option<f64>,
    stalled: bool,
}

impl StallDetector {
    pub fn new(epsilon: f64) -> Self {
        Self {
            epsilon,
            last_position: None,
            stalled: false,
        }
    }

    pub fn is_stalled(&self) -> bool {
        self.stalled
    }

    pub fn reset(&mut self) {
        self.last_position = None;
        self.stalled = false;
    }

    pub fn observe(&mut self, position: f64) -> StallVerdict {
        let Some(last) = self.last_position.replace(position) else {
            return StallVerdict::Baseline;
        };

        // A jump backwards is a loop or seek, which still counts as movement
        let moved = (position - last).abs() > self.epsilon;

        match (moved, self.stalled) {
            (true, true) => {
                self.stalled = false;
                StallVerdict::Resumed
            }
            (true, false) => StallVerdict::Advancing,
            (false, false) => {
                self.stalled = true;
                StallVerdict::Stalled
            }
            (false, true) => StallVerdict::StillStalled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_stall_report() {
        let mut detector = StallDetector::new(0.25);
        assert_eq!(detector.observe(4.0), StallVerdict::Baseline);
        assert_eq!(detector.observe(4.1), StallVerdict::Stalled);
        assert_eq!(detector.observe(4.1), StallVerdict::StillStalled);
        assert_eq!(detector.observe(4.2), StallVerdict::StillStalled);
        assert_eq!(detector.observe(6.2), StallVerdict::Resumed);
        assert_eq!(detector.observe(8.2), StallVerdict::Advancing);
    }

    #[test]
    fn test_loop_counts_as_movement() {
        let mut detector = StallDetector::new(0.25);
        detector.observe(59.0);
        assert_eq!(detector.observe(1.0), StallVerdict::Advancing);
    }

    #[test]
    fn test_reset_clears_baseline() {
        let mut detector = StallDetector::new(0.25);
        detector.observe(3.0);
        detector.observe(3.0);
        assert!(detector.is_stalled());
        detector.reset();
        assert!(!detector.is_stalled());
        assert_eq!(detector.observe(3.0), StallVerdict::Baseline);
    }
}
