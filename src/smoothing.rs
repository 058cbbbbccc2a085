use crate::config::TripConfig;
use crate::trip::TripState;

/// How the visual counters follow the true ones
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    /// Exponential approach, for the bursty ~1 Hz internal sensor
    Smoothed,
    /// Visual equals true, for the high-rate telemetry puck
    Immediate,
}

/// Exponential smoothing of the displayed trip values.
///
/// Each tick moves a visual counter a fixed fraction of the way to its true
/// value and snaps once the gap drops under the threshold, so convergence
/// finishes in a bounded number of ticks.
#[derive(Debug, Clone, Copy)]
pub struct DisplaySmoother {
    factor: f64,
    snap_threshold: f64,
}

impl DisplaySmoother {
    pub fn new(factor: f64, snap_threshold: f64) -> Self {
        DisplaySmoother {
            factor,
            snap_threshold,
        }
    }

    pub fn from_config(config: &TripConfig) -> Self {
        Self::new(config.smoothing_factor, config.snap_threshold_meters)
    }

    /// Advance the visual counters by one render frame
    pub fn tick(&self, state: &mut TripState, mode: DisplayMode) {
        match mode {
            DisplayMode::Immediate => state.align_visual(),
            DisplayMode::Smoothed => {
                state.visual_trip_a = self.approach(state.visual_trip_a, state.trip_a);
                state.visual_trip_b = self.approach(state.visual_trip_b, state.trip_b);
            }
        }
    }

    /// One smoothing step from `visual` toward `target`
    pub fn approach(&self, visual: f64, target: f64) -> f64 {
        let gap = target - visual;
        if gap.abs() > self.snap_threshold {
            visual + gap * self.factor
        } else {
            target
        }
    }
}

impl Default for DisplaySmoother {
    fn default() -> Self {
        Self::from_config(&TripConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_single_step() {
        let smoother = DisplaySmoother::default();
        assert_relative_eq!(smoother.approach(0.0, 10.0), 1.0);
    }

    #[test]
    fn test_snap_below_threshold() {
        let smoother = DisplaySmoother::default();
        assert_eq!(smoother.approach(9.96, 10.0), 10.0);
        assert_eq!(smoother.approach(10.0, 10.0), 10.0);
    }

    #[test]
    fn test_converges_exactly_without_overshoot() {
        let smoother = DisplaySmoother::default();
        let mut state = TripState {
            trip_a: 10.0,
            trip_b: 10.0,
            ..Default::default()
        };

        let mut ticks = 0;
        while state.visual_trip_a != state.trip_a {
            smoother.tick(&mut state, DisplayMode::Smoothed);
            assert!(state.visual_trip_a <= state.trip_a);
            ticks += 1;
            assert!(ticks < 100, "did not converge");
        }

        // 10 * 0.9^n < 0.05 once n >= 51
        assert_eq!(ticks, 52);
        assert_eq!(state.visual_trip_a, 10.0);
        assert_eq!(state.visual_trip_b, 10.0);
    }

    #[test]
    fn test_immediate_mode() {
        let smoother = DisplaySmoother::default();
        let mut state = TripState {
            trip_a: 3.0,
            trip_b: 300.0,
            ..Default::default()
        };
        smoother.tick(&mut state, DisplayMode::Immediate);
        assert_eq!(state.visual_trip_a, 3.0);
        assert_eq!(state.visual_trip_b, 300.0);
    }

    #[test]
    fn test_counters_move_independently() {
        let smoother = DisplaySmoother::default();
        let mut state = TripState {
            trip_a: 0.0,
            trip_b: 100.0,
            visual_trip_a: 0.0,
            visual_trip_b: 50.0,
        };
        smoother.tick(&mut state, DisplayMode::Smoothed);
        assert_eq!(state.visual_trip_a, 0.0);
        assert_relative_eq!(state.visual_trip_b, 55.0);
    }
}
