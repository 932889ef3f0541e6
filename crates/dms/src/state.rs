//! Driver state tracking

use serde::{Deserialize, Serialize};

/// Continuous-duration tracker for a per-frame boolean.
///
/// `elapsed_secs` is zero whenever `start_ns` is unset, and also on the
/// first active frame of a run, which only sets the start. The timer resets
/// on the first frame the tracked signal is false.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DurationTimer {
    start_ns: Option<u64>,
    elapsed_secs: f64,
}

impl DurationTimer {
    /// Advance the timer with this frame's signal value and return the duration
    pub fn update(&mut self, active: bool, now_ns: u64) -> f64 {
        if active {
            let start = *self.start_ns.get_or_insert(now_ns);
            self.elapsed_secs = now_ns.saturating_sub(start) as f64 / 1e9;
        } else {
            self.reset();
        }
        self.elapsed_secs
    }

    /// Current continuous duration (seconds)
    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed_secs
    }

    /// Timestamp of the first frame in the current run
    pub fn started_at_ns(&self) -> Option<u64> {
        self.start_ns
    }

    pub fn is_running(&self) -> bool {
        self.start_ns.is_some()
    }

    pub fn reset(&mut self) {
        self.start_ns = None;
        self.elapsed_secs = 0.0;
    }
}

/// Driver state (tracked over time)
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DriverState {
    /// Continuous eye closure
    pub eyes_closed: DurationTimer,

    /// Continuous head-down posture
    pub head_down: DurationTimer,

    /// Consecutive frames with no driver in view
    pub driver_absent_frames: u32,

    /// Frames classified since the last reset
    pub frames_seen: u64,
}

impl DriverState {
    /// Reset state (on driver change)
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SEC: u64 = 1_000_000_000;

    #[test]
    fn test_timer_tracks_continuous_run() {
        let mut timer = DurationTimer::default();
        assert_eq!(timer.update(true, 10 * SEC), 0.0);
        assert!(timer.is_running());
        assert_eq!(timer.update(true, 12 * SEC), 2.0);
        assert_eq!(timer.started_at_ns(), Some(10 * SEC));
    }

    #[test]
    fn test_timer_resets_on_falling_edge() {
        let mut timer = DurationTimer::default();
        timer.update(true, 0);
        timer.update(true, 4 * SEC);
        assert_eq!(timer.update(false, 4 * SEC + 1), 0.0);
        assert!(!timer.is_running());

        // No carry-over into the next run
        assert_eq!(timer.update(true, 5 * SEC), 0.0);
        assert_eq!(timer.update(true, 6 * SEC), 1.0);
    }

    #[test]
    fn test_driver_state_reset() {
        let mut state = DriverState::default();
        state.eyes_closed.update(true, 0);
        state.frames_seen = 10;
        state.reset();
        assert!(!state.eyes_closed.is_running());
        assert_eq!(state.frames_seen, 0);
    }

    proptest! {
        #[test]
        fn prop_timer_is_monotonic_while_active(
            steps in proptest::collection::vec((any::<bool>(), 0u64..500_000_000), 1..200)
        ) {
            let mut timer = DurationTimer::default();
            let mut now = 0u64;
            let mut run_start: Option<u64> = None;
            let mut previous = 0.0f64;

            for (active, dt) in steps {
                now += dt;
                let elapsed = timer.update(active, now);

                if active {
                    let start = *run_start.get_or_insert(now);
                    prop_assert!(elapsed >= previous);
                    prop_assert!((elapsed - (now - start) as f64 / 1e9).abs() < 1e-9);
                    previous = elapsed;
                } else {
                    run_start = None;
                    previous = 0.0;
                    prop_assert_eq!(elapsed, 0.0);
                    prop_assert!(timer.started_at_ns().is_none());
                }
            }
        }
    }
}
